use log::debug;
use smartstring::{LazyCompact, SmartString};
use thiserror::Error;

use crate::{
    algebra::times,
    diagram::{Diagram, DiagramError, Vertex},
    fermion_line::{self, FermionLine, LineAssembly},
    model::RuleError,
    GenerationSettings,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Diagram {diagram}, {element}: rule evaluation failed: {source}")]
    RuleEvaluation {
        diagram: SmartString<LazyCompact>,
        element: String,
        source: RuleError,
    },
    #[error("Diagram {diagram}: fermion lines could not be assembled: {source}")]
    Assembly {
        diagram: SmartString<LazyCompact>,
        source: DiagramError,
    },
}

/// Turns a [`Diagram`] into one product expression.
///
/// Factors come in a fixed order: the prefactor (if enabled), one factor per
/// fermion line, the vertices outside of lines, and finally the propagators no
/// line has absorbed.
pub struct ExpressionGenerator<'a> {
    settings: &'a GenerationSettings,
}

impl<'a> ExpressionGenerator<'a> {
    pub fn new(settings: &'a GenerationSettings) -> Self {
        ExpressionGenerator { settings }
    }

    pub fn generate(&self, diagram: &Diagram) -> Result<String, GenerationError> {
        let assembly = fermion_line::assemble(diagram, &self.settings.fermion_vertices)
            .map_err(|source| GenerationError::Assembly {
                diagram: diagram.id.clone(),
                source,
            })?;
        self.generate_with_lines(diagram, &assembly)
    }

    pub fn generate_with_lines(
        &self,
        diagram: &Diagram,
        assembly: &LineAssembly,
    ) -> Result<String, GenerationError> {
        let mut factors = Vec::new();
        if self.settings.include_prefactor {
            if let Some(prefactor) = &diagram.prefactor {
                factors.push(prefactor.clone());
            }
        }

        let mut consumed = vec![false; diagram.propagators.len()];
        for line in &assembly.lines {
            factors.push(self.line_factor(diagram, line, &mut consumed)?);
        }

        for &position in &assembly.others {
            factors.push(self.vertex_factor(diagram, &diagram.vertices[position], None)?);
        }

        for (propagator, _) in diagram
            .propagators
            .iter()
            .zip(&consumed)
            .filter(|(_, &used)| !used)
        {
            factors.push(propagator.generate().map_err(|source| {
                GenerationError::RuleEvaluation {
                    diagram: diagram.id.clone(),
                    element: propagator.to_string(),
                    source,
                }
            })?);
        }

        debug!(
            "Diagram {}: {} factors from {} line(s)",
            diagram.id,
            factors.len(),
            assembly.lines.len()
        );
        Ok(times(&factors))
    }

    fn vertex_factor(
        &self,
        diagram: &Diagram,
        vertex: &Vertex,
        line: Option<usize>,
    ) -> Result<String, GenerationError> {
        vertex
            .generate(line)
            .map_err(|source| GenerationError::RuleEvaluation {
                diagram: diagram.id.clone(),
                element: vertex.to_string(),
                source,
            })
    }

    /// Members in line order, each followed by the propagator leaving its
    /// fermion leg. Closed lines become a trace, open lines get an opening factor.
    fn line_factor(
        &self,
        diagram: &Diagram,
        line: &FermionLine,
        consumed: &mut [bool],
    ) -> Result<String, GenerationError> {
        let mut members = Vec::with_capacity(2 * line.len() + 1);
        if line.open {
            let mut arguments = vec![line.index.to_string()];
            arguments.extend(line.external_ids(diagram).iter().map(|id| id.to_string()));
            members.push(format!(
                "{}({})",
                self.settings.open_line_symbol,
                arguments.join(",")
            ));
        }

        for vertex in line.members(diagram) {
            members.push(self.vertex_factor(diagram, vertex, Some(line.index))?);

            let fermion_leg = fermion_line::fermion_legs(vertex).map(|(_, fermion)| &fermion.id);
            if let Some(propagator) = fermion_leg.and_then(|id| diagram.propagator_on(id)) {
                if !consumed[propagator.position()] {
                    consumed[propagator.position()] = true;
                    members.push(propagator.generate().map_err(|source| {
                        GenerationError::RuleEvaluation {
                            diagram: diagram.id.clone(),
                            element: propagator.to_string(),
                            source,
                        }
                    })?);
                }
            }
        }

        let product = times(&members);
        if line.open {
            Ok(product)
        } else {
            Ok(format!(
                "{}({},{})",
                self.settings.trace_symbol, line.index, product
            ))
        }
    }
}
