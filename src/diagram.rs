//! In-memory picture of one diagram, built once from its parsed record.
//!
//! Every vertex and propagator carries the rule it was resolved to in the model,
//! and every field is shared between the vertex that owns it and the propagators
//! that end on it.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};
use thiserror::Error;

use crate::model::{
    self, FieldAssignment, FieldRef, Model, ModelError, Particle, PropagatorAssignment, RuleError,
    VertexRule,
};

/// Prefix marking the identifier of an external leg.
pub const EXTERNAL_PREFIX: &str = "ext";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiagramError {
    #[error("Diagram {diagram}, vertex {vertex}: malformed record ({reason})")]
    MalformedVertexRecord {
        diagram: SmartString<LazyCompact>,
        vertex: usize,
        reason: String,
    },
    #[error("Diagram {diagram}: field id '{id}' is declared more than once")]
    DuplicateFieldId {
        diagram: SmartString<LazyCompact>,
        id: SmartString<LazyCompact>,
    },
    #[error("Diagram {diagram}, propagator {propagator}: no field with id '{id}'")]
    DanglingPropagator {
        diagram: SmartString<LazyCompact>,
        propagator: usize,
        id: SmartString<LazyCompact>,
    },
    #[error("Diagram {diagram}, propagator {propagator}: {count} fields with id '{id}'")]
    AmbiguousPropagator {
        diagram: SmartString<LazyCompact>,
        propagator: usize,
        id: SmartString<LazyCompact>,
        count: usize,
    },
    #[error(
        "Diagram {diagram}, propagator {propagator}: field '{id}' is a {found}, the record declares {declared}"
    )]
    PropagatorFieldMismatch {
        diagram: SmartString<LazyCompact>,
        propagator: usize,
        id: SmartString<LazyCompact>,
        declared: SmartString<LazyCompact>,
        found: SmartString<LazyCompact>,
    },
    #[error("Diagram {diagram}: {source}")]
    Model {
        diagram: SmartString<LazyCompact>,
        source: ModelError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegRecord {
    pub particle_name: SmartString<LazyCompact>,
    pub leg_index: isize,
    pub momentum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VertexRecord {
    pub particle_names: Vec<SmartString<LazyCompact>>,
    pub leg_indices: Vec<isize>,
    pub momenta: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropagatorRecord {
    pub from_index: isize,
    pub to_index: isize,
    pub momentum: String,
    #[serde(default)]
    pub from_particle: Option<SmartString<LazyCompact>>,
    #[serde(default)]
    pub to_particle: Option<SmartString<LazyCompact>>,
}

/// One diagram as handed over by the parsing collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagramRecord {
    pub id: SmartString<LazyCompact>,
    #[serde(default)]
    pub prefactor: Option<String>,
    #[serde(default)]
    pub external_legs: Vec<LegRecord>,
    #[serde(default)]
    pub vertices: Vec<VertexRecord>,
    #[serde(default)]
    pub propagators: Vec<PropagatorRecord>,
}

/// A specific insertion of a particle at a leg of the diagram.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: SmartString<LazyCompact>,
    pub id: SmartString<LazyCompact>,
    pub leg: isize,
    pub momentum: String,
    pub particle: Arc<Particle>,
}

impl Field {
    pub fn new(model: &Model, name: &str, leg: isize, momentum: &str) -> Result<Field, ModelError> {
        Ok(Field {
            name: name.into(),
            id: Field::normalise_id(leg),
            leg,
            momentum: momentum.to_string(),
            particle: model.get_particle(name)?,
        })
    }

    /// `3` stays `3`, external legs (negative indices) become `ext3`.
    pub fn normalise_id(leg: isize) -> SmartString<LazyCompact> {
        if leg < 0 {
            format!("{}{}", EXTERNAL_PREFIX, leg.unsigned_abs()).into()
        } else {
            leg.to_string().into()
        }
    }

    pub fn is_external(&self) -> bool {
        self.leg < 0
    }

    pub fn matches_id(&self, leg: isize) -> bool {
        self.id == Field::normalise_id(leg)
    }

    pub fn rule_view(&self) -> FieldRef<'_> {
        FieldRef {
            id: &self.id,
            momentum: &self.momentum,
            particle: &self.particle,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

/// An interaction point. Fields keep the order of the record.
#[derive(Debug, Clone)]
pub struct Vertex {
    position: usize,
    fields: Vec<Arc<Field>>,
    interaction: Arc<model::Interaction>,
}

impl Vertex {
    pub fn from_record(
        model: &Model,
        diagram: &str,
        position: usize,
        record: &VertexRecord,
    ) -> Result<Vertex, DiagramError> {
        let (n_types, n_legs, n_momenta) = (
            record.particle_names.len(),
            record.leg_indices.len(),
            record.momenta.len(),
        );
        if n_types != n_legs || n_types != n_momenta {
            return Err(DiagramError::MalformedVertexRecord {
                diagram: diagram.into(),
                vertex: position,
                reason: format!(
                    "{} particle types, {} leg indices and {} momenta",
                    n_types, n_legs, n_momenta
                ),
            });
        }

        let in_model = |source| DiagramError::Model {
            diagram: diagram.into(),
            source,
        };

        let mut fields: Vec<Arc<Field>> = Vec::with_capacity(n_types);
        for ((name, &leg), momentum) in record
            .particle_names
            .iter()
            .zip(&record.leg_indices)
            .zip(&record.momenta)
        {
            let field = Field::new(model, name, leg, momentum).map_err(in_model)?;
            if fields.iter().any(|f| f.id == field.id) {
                return Err(DiagramError::DuplicateFieldId {
                    diagram: diagram.into(),
                    id: field.id,
                });
            }
            fields.push(Arc::new(field));
        }

        let interaction = model
            .get_interaction(&record.particle_names)
            .map_err(in_model)?;

        Ok(Vertex {
            position,
            fields,
            interaction,
        })
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    pub fn field(&self, position: usize) -> Option<&Arc<Field>> {
        self.fields.get(position)
    }

    pub fn interaction(&self) -> &Arc<model::Interaction> {
        &self.interaction
    }

    /// The field playing the `slot`-th participant of the interaction. Repeated
    /// particles are matched in attachment order.
    pub fn participant_field(&self, slot: usize) -> Option<&Arc<Field>> {
        let particle = self.interaction.particles.get(slot)?;
        let occurrence = self.interaction.particles[..slot]
            .iter()
            .filter(|p| p.name == particle.name)
            .count();
        self.fields
            .iter()
            .filter(|f| f.name == particle.name)
            .nth(occurrence)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Field>> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn has_external_field(&self) -> bool {
        self.fields.iter().any(|f| f.is_external())
    }

    /// Evaluate the Feynman rule of this vertex. The line index is only handed to
    /// rules that depend on it.
    pub fn generate(&self, line: Option<usize>) -> Result<String, RuleError> {
        let line_dependent = self.interaction.rule.line_dependent();
        let fields = FieldAssignment::new(
            &self.interaction.particles,
            self.fields.iter().map(|f| f.rule_view()),
        )
        .with_line(if line_dependent { line } else { None });
        self.interaction.generate(&fields)
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vertex {} ({})",
            self.position,
            self.fields.iter().map(|field| field.to_string()).join(", ")
        )
    }
}

/// An internal line. `from_field` and `to_field` follow the momentum flow.
#[derive(Debug, Clone)]
pub struct Propagator {
    position: usize,
    pub from_field: Arc<Field>,
    pub to_field: Arc<Field>,
    pub momentum: String,
    pub propagator: Arc<model::Propagator>,
}

impl Propagator {
    pub fn from_record<'a>(
        model: &Model,
        diagram: &str,
        position: usize,
        record: &PropagatorRecord,
        fields: impl Iterator<Item = &'a Arc<Field>> + Clone,
    ) -> Result<Propagator, DiagramError> {
        let resolve = |leg: isize,
                       declared: &Option<SmartString<LazyCompact>>|
         -> Result<Arc<Field>, DiagramError> {
            let id = Field::normalise_id(leg);
            let field = resolve_endpoint(fields.clone(), &id).map_err(|count| {
                if count == 0 {
                    DiagramError::DanglingPropagator {
                        diagram: diagram.into(),
                        propagator: position,
                        id: id.clone(),
                    }
                } else {
                    DiagramError::AmbiguousPropagator {
                        diagram: diagram.into(),
                        propagator: position,
                        id: id.clone(),
                        count,
                    }
                }
            })?;
            if let Some(declared) = declared {
                if *declared != field.name {
                    return Err(DiagramError::PropagatorFieldMismatch {
                        diagram: diagram.into(),
                        propagator: position,
                        id,
                        declared: declared.clone(),
                        found: field.name.clone(),
                    });
                }
            }
            Ok(field)
        };

        let from_field = resolve(record.from_index, &record.from_particle)?;
        let to_field = resolve(record.to_index, &record.to_particle)?;
        let propagator = model
            .get_propagator(&from_field.particle.name, &to_field.particle.name)
            .map_err(|source| DiagramError::Model {
                diagram: diagram.into(),
                source,
            })?;

        Ok(Propagator {
            position,
            from_field,
            to_field,
            momentum: record.momentum.clone(),
            propagator,
        })
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn ends_on(&self, id: &str) -> bool {
        self.from_field.id == id || self.to_field.id == id
    }

    pub fn generate(&self) -> Result<String, RuleError> {
        self.propagator.generate(&PropagatorAssignment {
            from: self.from_field.rule_view(),
            to: self.to_field.rule_view(),
            momentum: &self.momentum,
        })
    }
}

impl fmt::Display for Propagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "propagator {} ({} -> {})",
            self.position, self.from_field, self.to_field
        )
    }
}

/// Find the only field with identifier `id`. On failure, returns how many fields matched.
pub fn resolve_endpoint<'a>(
    candidates: impl IntoIterator<Item = &'a Arc<Field>>,
    id: &str,
) -> Result<Arc<Field>, usize> {
    let matches = candidates
        .into_iter()
        .filter(|f| f.id == id)
        .collect::<Vec<_>>();
    match matches.as_slice() {
        [field] => Ok(Arc::clone(field)),
        other => Err(other.len()),
    }
}

#[derive(Debug, Clone)]
pub struct Diagram {
    pub id: SmartString<LazyCompact>,
    pub prefactor: Option<String>,
    pub external_fields: Vec<Arc<Field>>,
    pub vertices: Vec<Vertex>,
    /// Every vertex field by identifier.
    pub fields: IndexMap<SmartString<LazyCompact>, Arc<Field>>,
    pub propagators: Vec<Propagator>,
}

impl Diagram {
    pub fn from_record(model: &Model, record: &DiagramRecord) -> Result<Diagram, DiagramError> {
        let diagram = record.id.as_str();

        let external_fields = record
            .external_legs
            .iter()
            .map(|leg| {
                Field::new(model, &leg.particle_name, leg.leg_index, &leg.momentum)
                    .map(Arc::new)
                    .map_err(|source| DiagramError::Model {
                        diagram: diagram.into(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let vertices = record
            .vertices
            .iter()
            .enumerate()
            .map(|(position, v)| Vertex::from_record(model, diagram, position, v))
            .collect::<Result<Vec<_>, _>>()?;

        let mut fields = IndexMap::new();
        for field in vertices.iter().flat_map(|v| v.fields.iter()) {
            if fields.insert(field.id.clone(), field.clone()).is_some() {
                return Err(DiagramError::DuplicateFieldId {
                    diagram: diagram.into(),
                    id: field.id.clone(),
                });
            }
        }

        let propagators = record
            .propagators
            .iter()
            .enumerate()
            .map(|(position, p)| {
                Propagator::from_record(model, diagram, position, p, fields.values())
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "Built diagram {}: {} vertices, {} propagators, {} external legs",
            diagram,
            vertices.len(),
            propagators.len(),
            external_fields.len()
        );

        Ok(Diagram {
            id: record.id.clone(),
            prefactor: record.prefactor.clone(),
            external_fields,
            vertices,
            fields,
            propagators,
        })
    }

    /// The propagator attached to the field `id`, if any.
    pub fn propagator_on(&self, id: &str) -> Option<&Propagator> {
        self.propagators.iter().find(|p| p.ends_on(id))
    }
}

impl fmt::Display for Diagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "diagram {}", self.id)?;
        for v in &self.vertices {
            writeln!(f, "  {}", v)?;
        }
        for p in &self.propagators {
            writeln!(f, "  {}", p)?;
        }
        Ok(())
    }
}
