//! Threading of fermion vertices into oriented lines.
//!
//! The first participant of a fermion interaction is the antifermion, the second
//! one the fermion; the vertex fields matched onto them are its fermion legs.
//! Along a line, the fermion leg `k` of one member continues into the
//! antifermion leg `k + 1` of the next member, so lines run against the fermion
//! flow. A line is open as soon as one of its members carries an external
//! field, and is emitted as a trace otherwise.

use std::{collections::HashMap, fmt, sync::Arc};

use ahash::RandomState;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};

use crate::{
    diagram::{Diagram, DiagramError, Field, Vertex},
    model::Interaction,
};

/// Which vertices take part in fermion lines.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FermionVertexSelection {
    /// Every vertex whose interaction couples at least one fermion.
    #[default]
    BySpin,
    /// Only the listed interactions, by identity key or by particle content
    /// (`tbar,t,g` matches in any order).
    Explicit(Vec<SmartString<LazyCompact>>),
}

impl FermionVertexSelection {
    pub fn selects(&self, interaction: &Interaction) -> bool {
        match self {
            FermionVertexSelection::BySpin => interaction.particles.iter().any(|p| p.is_fermion()),
            FermionVertexSelection::Explicit(keys) => {
                let canonical = interaction.canonical_key();
                keys.iter().any(|key| {
                    *key == interaction.name
                        || key.split(',').map(str::trim).sorted_unstable().join(",") == canonical
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FermionLine {
    /// Numbered from 1, in the order lines are discovered.
    pub index: usize,
    /// Positions in the diagram's vertex list, ordered along the line.
    pub vertices: Vec<usize>,
    pub open: bool,
}

impl FermionLine {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn contains(&self, vertex: usize) -> bool {
        self.vertices.contains(&vertex)
    }

    pub fn members<'d>(&'d self, diagram: &'d Diagram) -> impl Iterator<Item = &'d Vertex> + 'd {
        self.vertices.iter().map(|&v| &diagram.vertices[v])
    }

    /// Identifiers of the external legs the line starts and ends on.
    pub fn external_ids(&self, diagram: &Diagram) -> Vec<SmartString<LazyCompact>> {
        self.members(diagram)
            .filter_map(fermion_legs)
            .flat_map(|(antifermion, fermion)| [antifermion, fermion])
            .filter(|f| f.is_external())
            .map(|f| f.id.clone())
            .collect()
    }
}

impl fmt::Display for FermionLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {} ({}): [{}]",
            self.index,
            if self.open { "open" } else { "closed" },
            self.vertices.iter().join(" -> ")
        )
    }
}

/// Fermion lines of a diagram together with the vertices left out of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineAssembly {
    pub lines: Vec<FermionLine>,
    /// Vertices that belong to no line, in diagram order.
    pub others: Vec<usize>,
}

impl LineAssembly {
    pub fn line_of(&self, vertex: usize) -> Option<&FermionLine> {
        self.lines.iter().find(|l| l.contains(vertex))
    }
}

/// Antifermion and fermion field of a vertex.
pub fn fermion_legs(vertex: &Vertex) -> Option<(&Arc<Field>, &Arc<Field>)> {
    Some((vertex.participant_field(0)?, vertex.participant_field(1)?))
}

fn internal_leg(field: &Field) -> Option<isize> {
    (!field.is_external()).then_some(field.leg)
}

/// Split the vertices of `diagram` into fermion lines and everything else.
///
/// Every selected vertex ends up in exactly one line. Open lines start at the
/// member with no predecessor; closed lines start at their first member in
/// diagram order.
pub fn assemble(
    diagram: &Diagram,
    selection: &FermionVertexSelection,
) -> Result<LineAssembly, DiagramError> {
    let mut others = Vec::new();
    let mut fermion_vertices = Vec::new();
    let mut legs: HashMap<usize, (&Arc<Field>, &Arc<Field>), RandomState> = HashMap::default();
    for (position, vertex) in diagram.vertices.iter().enumerate() {
        if !selection.selects(vertex.interaction()) {
            others.push(position);
            continue;
        }
        let Some(pair) = fermion_legs(vertex) else {
            return Err(DiagramError::MalformedVertexRecord {
                diagram: diagram.id.clone(),
                vertex: position,
                reason: format!(
                    "fermion vertex with {} field(s), at least 2 needed",
                    vertex.fields().len()
                ),
            });
        };
        legs.insert(position, pair);
        fermion_vertices.push(position);
    }

    // antifermion leg -> vertex carrying it
    let entry: HashMap<isize, usize, RandomState> = legs
        .iter()
        .filter_map(|(&v, (antifermion, _))| internal_leg(antifermion).map(|leg| (leg, v)))
        .collect();

    let mut next: HashMap<usize, usize, RandomState> = HashMap::default();
    let mut prev: HashMap<usize, usize, RandomState> = HashMap::default();
    for (&v, (_, fermion)) in &legs {
        let Some(leg) = internal_leg(fermion) else {
            continue;
        };
        if let Some(&successor) = entry.get(&(leg + 1)) {
            next.insert(v, successor);
            prev.insert(successor, v);
        }
    }

    let mut placed: HashMap<usize, usize, RandomState> = HashMap::default();
    let mut lines: Vec<FermionLine> = Vec::new();
    for &v in &fermion_vertices {
        if placed.contains_key(&v) {
            continue;
        }

        // Walk back to the head of the line, or around the loop back to `v`.
        let mut head = v;
        while let Some(&p) = prev.get(&head) {
            if p == v {
                head = v;
                break;
            }
            head = p;
        }

        let mut members = vec![head];
        let mut current = head;
        while let Some(&n) = next.get(&current) {
            if n == head {
                break;
            }
            members.push(n);
            current = n;
        }

        let open = members
            .iter()
            .any(|&m| diagram.vertices[m].has_external_field());
        let line = FermionLine {
            index: lines.len() + 1,
            vertices: members,
            open,
        };
        for &m in &line.vertices {
            placed.insert(m, line.index);
        }
        debug!("Diagram {}: {}", diagram.id, line);
        lines.push(line);
    }

    Ok(LineAssembly { lines, others })
}
