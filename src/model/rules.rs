use std::fmt;

use enum_dispatch::enum_dispatch;
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};
use thiserror::Error;

use crate::algebra::{attach_indices, minus, plus, times, I};

use super::Particle;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("missing key: {0}")]
    MissingKey(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// The part of a diagram field a Feynman rule is allowed to see.
#[derive(Debug, Clone, Copy)]
pub struct FieldRef<'a> {
    pub id: &'a str,
    pub momentum: &'a str,
    pub particle: &'a Particle,
}

impl fmt::Display for FieldRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.particle.name, self.id)
    }
}

/// Fields attached to one vertex, grouped by particle name in attachment order.
#[derive(Debug, Clone)]
pub struct FieldAssignment<'a> {
    participants: &'a [std::sync::Arc<Particle>],
    ordered: Vec<FieldRef<'a>>,
    by_particle: IndexMap<&'a str, Vec<usize>>,
    line: Option<usize>,
}

impl<'a> FieldAssignment<'a> {
    pub fn new(
        participants: &'a [std::sync::Arc<Particle>],
        fields: impl IntoIterator<Item = FieldRef<'a>>,
    ) -> Self {
        let ordered: Vec<_> = fields.into_iter().collect();
        let mut by_particle: IndexMap<&'a str, Vec<usize>> = IndexMap::new();
        for (position, field) in ordered.iter().enumerate() {
            by_particle
                .entry(field.particle.name.as_str())
                .or_default()
                .push(position);
        }
        FieldAssignment {
            participants,
            ordered,
            by_particle,
            line: None,
        }
    }

    pub fn with_line(mut self, line: Option<usize>) -> Self {
        self.line = line;
        self
    }

    pub fn line(&self) -> Result<usize, RuleError> {
        self.line
            .ok_or_else(|| RuleError::MissingKey("fermion line index".into()))
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn fields(&self) -> &[FieldRef<'a>] {
        &self.ordered
    }

    pub fn at(&self, position: usize) -> Result<FieldRef<'a>, RuleError> {
        self.ordered.get(position).copied().ok_or_else(|| {
            RuleError::MissingKey(format!(
                "field position {} (vertex has {} fields)",
                position,
                self.ordered.len()
            ))
        })
    }

    /// The `occurrence`-th field carrying particle `name`.
    pub fn get(&self, name: &str, occurrence: usize) -> Result<FieldRef<'a>, RuleError> {
        self.by_particle
            .get(name)
            .and_then(|positions| positions.get(occurrence))
            .map(|&p| self.ordered[p])
            .ok_or_else(|| RuleError::MissingKey(format!("{}[{}]", name, occurrence)))
    }

    /// The field playing the role of the `slot`-th participant of the interaction.
    ///
    /// Repeated participants are matched to repeated fields in attachment order.
    pub fn participant(&self, slot: usize) -> Result<FieldRef<'a>, RuleError> {
        let particle = self.participants.get(slot).ok_or_else(|| {
            RuleError::MissingKey(format!("participant slot {}", slot))
        })?;
        let occurrence = self.participants[..slot]
            .iter()
            .filter(|p| p.name == particle.name)
            .count();
        self.get(&particle.name, occurrence)
    }
}

/// Both ends of a propagator, ordered along the momentum flow.
#[derive(Debug, Clone, Copy)]
pub struct PropagatorAssignment<'a> {
    pub from: FieldRef<'a>,
    pub to: FieldRef<'a>,
    pub momentum: &'a str,
}

impl PropagatorAssignment<'_> {
    pub fn mass(&self) -> &str {
        &self.from.particle.mass.symbol
    }
}

#[enum_dispatch]
pub trait VertexRule {
    fn evaluate(&self, fields: &FieldAssignment<'_>) -> Result<String, RuleError>;

    /// Rules that index Dirac matrices by fermion line need the line number.
    fn line_dependent(&self) -> bool {
        false
    }

    fn couplings(&self) -> Vec<&str> {
        vec![]
    }
}

#[enum_dispatch(VertexRule)]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VertexRuleKind {
    Constant(ConstantRule),
    Template(TemplateRule),
    FermionScalar(FermionScalarRule),
    FermionVector(FermionVectorRule),
    TripleVector(TripleVectorRule),
    QuarticVector(QuarticVectorRule),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstantRule {
    pub expression: SmartString<LazyCompact>,
}

impl VertexRule for ConstantRule {
    fn evaluate(&self, _fields: &FieldAssignment<'_>) -> Result<String, RuleError> {
        Ok(self.expression.to_string())
    }
}

/// Free-form rule with `{...}` placeholders.
///
/// Supported placeholders: `{name.k}` (id of the k-th field of particle `name`),
/// `{#k}` (id of the field at position k), `{p#k}` (its momentum), `{m#k}` (its mass)
/// and `{line}` (the fermion line index).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateRule {
    pub expression: SmartString<LazyCompact>,
}

fn parse_position(token: &str) -> Result<usize, RuleError> {
    token
        .parse()
        .map_err(|_| RuleError::InvalidValue(format!("'{}' is not a field position", token)))
}

/// Replace every `{key}` in `template` by `resolve(key)`.
pub(crate) fn fill_template(
    template: &str,
    mut resolve: impl FnMut(&str) -> Result<String, RuleError>,
) -> Result<String, RuleError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            RuleError::InvalidValue(format!("unterminated placeholder in '{}'", template))
        })?;
        out.push_str(&resolve(after[..end].trim())?);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

impl VertexRule for TemplateRule {
    fn evaluate(&self, fields: &FieldAssignment<'_>) -> Result<String, RuleError> {
        fill_template(&self.expression, |key| {
            if key == "line" {
                return Ok(fields.line()?.to_string());
            }
            if let Some(position) = key.strip_prefix("p#") {
                return Ok(fields.at(parse_position(position)?)?.momentum.to_string());
            }
            if let Some(position) = key.strip_prefix("m#") {
                let field = fields.at(parse_position(position)?)?;
                return Ok(field.particle.mass.symbol.to_string());
            }
            if let Some(position) = key.strip_prefix('#') {
                return Ok(fields.at(parse_position(position)?)?.id.to_string());
            }
            match key.rsplit_once('.') {
                Some((name, occurrence)) => {
                    Ok(fields.get(name, parse_position(occurrence)?)?.id.to_string())
                }
                None => Err(RuleError::InvalidValue(format!(
                    "unknown placeholder '{{{}}}'",
                    key
                ))),
            }
        })
    }

    fn line_dependent(&self) -> bool {
        self.expression.contains("{line}")
    }
}

/// Yukawa-type coupling of a fermion pair to a scalar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FermionScalarRule {
    pub coupling: SmartString<LazyCompact>,
}

impl VertexRule for FermionScalarRule {
    fn evaluate(&self, fields: &FieldAssignment<'_>) -> Result<String, RuleError> {
        let antifermion = fields.participant(0)?;
        let fermion = fields.participant(1)?;
        Ok(times(&[
            format!("(-{})*{}", I, self.coupling),
            format!("d_(col{},col{})", antifermion.id, fermion.id),
            format!("d_(s{},s{})", antifermion.id, fermion.id),
        ]))
    }

    fn couplings(&self) -> Vec<&str> {
        vec![self.coupling.as_str()]
    }
}

/// Gauge coupling of a fermion pair to a coloured vector boson.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FermionVectorRule {
    pub coupling: SmartString<LazyCompact>,
}

impl VertexRule for FermionVectorRule {
    fn evaluate(&self, fields: &FieldAssignment<'_>) -> Result<String, RuleError> {
        let antifermion = fields.participant(0)?;
        let fermion = fields.participant(1)?;
        let vector = fields.participant(2)?;
        let line = fields.line()?;
        Ok(times(&[
            format!("{}*{}", I, self.coupling),
            format!("g_({},mu{})", line, vector.id),
            format!("T(b{},col{},col{})", vector.id, antifermion.id, fermion.id),
        ]))
    }

    fn line_dependent(&self) -> bool {
        true
    }

    fn couplings(&self) -> Vec<&str> {
        vec![self.coupling.as_str()]
    }
}

/// Three-gluon vertex with its momentum-dependent Lorentz structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripleVectorRule {
    pub coupling: SmartString<LazyCompact>,
}

impl VertexRule for TripleVectorRule {
    fn evaluate(&self, fields: &FieldAssignment<'_>) -> Result<String, RuleError> {
        let legs = (0..3)
            .map(|slot| fields.participant(slot))
            .collect::<Result<Vec<_>, _>>()?;

        let mut lorentz = Vec::with_capacity(3);
        for i in 0..3 {
            let (a, b, c) = (legs[i], legs[(i + 1) % 3], legs[(i + 2) % 3]);
            let index = [format!("mu{}", c.id)];
            lorentz.push(times(&[
                format!("d_(mu{},mu{})", a.id, b.id),
                plus(&[
                    attach_indices(a.momentum, &index),
                    minus(&attach_indices(b.momentum, &index)),
                ]),
            ]));
        }

        Ok(times(&[
            minus(&self.coupling),
            format!("f(b{},b{},b{})", legs[0].id, legs[1].id, legs[2].id),
            plus(&lorentz),
        ]))
    }

    fn couplings(&self) -> Vec<&str> {
        vec![self.coupling.as_str()]
    }
}

/// Four-gluon contact vertex.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuarticVectorRule {
    pub coupling: SmartString<LazyCompact>,
}

impl VertexRule for QuarticVectorRule {
    fn evaluate(&self, fields: &FieldAssignment<'_>) -> Result<String, RuleError> {
        let legs = (0..4)
            .map(|slot| fields.participant(slot).map(|f| f.id))
            .collect::<Result<Vec<_>, _>>()?;
        let dummy = format!("bd{}", legs.iter().join(""));
        let f = |x: usize, y: usize| format!("f(b{},b{},{})", legs[x], legs[y], dummy);
        let d = |x: usize, y: usize| format!("d_(mu{},mu{})", legs[x], legs[y]);

        // (colour pair, metric term, subtracted metric term) for the three channels
        let channels = [
            ((0, 1, 2, 3), (0, 2, 1, 3), (0, 3, 1, 2)),
            ((0, 2, 1, 3), (0, 1, 2, 3), (0, 3, 1, 2)),
            ((0, 3, 1, 2), (0, 1, 2, 3), (0, 2, 1, 3)),
        ];
        let terms = channels
            .iter()
            .map(|&((a, b, c, e), (g, h, k, l), (m, n, o, q))| {
                times(&[
                    f(a, b),
                    f(c, e),
                    plus(&[times(&[d(g, h), d(k, l)]), minus(&times(&[d(m, n), d(o, q)]))]),
                ])
            })
            .collect::<Vec<_>>();

        Ok(times(&[
            format!("(-{})*{}^2", I, self.coupling),
            plus(&terms),
        ]))
    }

    fn couplings(&self) -> Vec<&str> {
        vec![self.coupling.as_str()]
    }
}

#[enum_dispatch]
pub trait PropagatorRule {
    fn evaluate(&self, ends: &PropagatorAssignment<'_>) -> Result<String, RuleError>;
}

#[enum_dispatch(PropagatorRule)]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropagatorRuleKind {
    Scalar(ScalarPropagator),
    Fermion(FermionPropagator),
    Vector(VectorPropagator),
    Template(TemplatePropagator),
}

/// The `1/(p^2-m^2)` common to every Lorentz-invariant propagator.
pub fn denominator(momentum: &str, mass: &str) -> String {
    format!("Den({},{})", momentum, mass)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScalarPropagator {}

impl PropagatorRule for ScalarPropagator {
    fn evaluate(&self, ends: &PropagatorAssignment<'_>) -> Result<String, RuleError> {
        Ok(times(&[
            I.to_string(),
            denominator(ends.momentum, ends.mass()),
        ]))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FermionPropagator {
    #[serde(default)]
    pub color: bool,
}

impl PropagatorRule for FermionPropagator {
    fn evaluate(&self, ends: &PropagatorAssignment<'_>) -> Result<String, RuleError> {
        let (from, to, mass) = (ends.from.id, ends.to.id, ends.mass());
        let kinematic = times(&[
            I.to_string(),
            format!(
                "g({p},x{from},x{to}) + {mass}*g(x{from},x{to})",
                p = ends.momentum
            ),
            denominator(ends.momentum, mass),
        ]);
        if self.color {
            Ok(times(&[kinematic, format!("d_(i{},i{})", from, to)]))
        } else {
            Ok(kinematic)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VectorPropagator {
    #[serde(default)]
    pub color: bool,
}

impl PropagatorRule for VectorPropagator {
    fn evaluate(&self, ends: &PropagatorAssignment<'_>) -> Result<String, RuleError> {
        let mut factors = vec![
            format!("-{}", I),
            denominator(ends.momentum, ends.mass()),
            format!("d_(mu{},mu{})", ends.from.id, ends.to.id),
        ];
        if self.color {
            factors.push(format!("d_(b{},b{})", ends.from.id, ends.to.id));
        }
        Ok(times(&factors))
    }
}

/// Free-form propagator with `{from}`, `{to}`, `{p}` and `{m}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplatePropagator {
    pub expression: SmartString<LazyCompact>,
}

impl PropagatorRule for TemplatePropagator {
    fn evaluate(&self, ends: &PropagatorAssignment<'_>) -> Result<String, RuleError> {
        fill_template(&self.expression, |key| match key {
            "from" => Ok(ends.from.id.to_string()),
            "to" => Ok(ends.to.id.to_string()),
            "p" => Ok(ends.momentum.to_string()),
            "m" => Ok(ends.mass().to_string()),
            other => Err(RuleError::MissingKey(format!("{{{}}}", other))),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::Parameter;

    fn particle(name: &str, mass: &str, spin: isize) -> Arc<Particle> {
        Arc::new(Particle {
            name: name.into(),
            mass: Arc::new(Parameter::new(mass)),
            spin,
            self_conjugate: false,
        })
    }

    #[test]
    fn participants_follow_attachment_order_for_repeated_particles() {
        let g = particle("g", "0", 3);
        let participants = vec![g.clone(), g.clone(), g.clone()];
        let fields = FieldAssignment::new(
            &participants,
            ["5", "2", "7"].into_iter().map(|id| FieldRef {
                id,
                momentum: "k1",
                particle: &g,
            }),
        );
        assert_eq!(fields.participant(0).unwrap().id, "5");
        assert_eq!(fields.participant(2).unwrap().id, "7");
        assert_eq!(fields.get("g", 1).unwrap().id, "2");
        assert!(matches!(fields.get("g", 3), Err(RuleError::MissingKey(_))));
        assert!(matches!(fields.get("H", 0), Err(RuleError::MissingKey(_))));
    }

    #[test]
    fn template_placeholders() {
        let t = particle("t", "mt", 2);
        let tbar = particle("tbar", "mt", 2);
        let participants = vec![tbar.clone(), t.clone()];
        let fields = FieldAssignment::new(
            &participants,
            [
                FieldRef {
                    id: "ext1",
                    momentum: "p1",
                    particle: &tbar,
                },
                FieldRef {
                    id: "2",
                    momentum: "-q1",
                    particle: &t,
                },
            ],
        )
        .with_line(Some(3));

        let rule = TemplateRule {
            expression: "g_({line},{#1})*d_(col{tbar.0},col{t.0})*{p#1}*{m#0}".into(),
        };
        assert!(rule.line_dependent());
        assert_eq!(
            rule.evaluate(&fields).unwrap(),
            "g_(3,2)*d_(colext1,col2)*-q1*mt"
        );

        let broken = TemplateRule {
            expression: "d_(col{H.0},x)".into(),
        };
        assert!(!broken.line_dependent());
        assert!(matches!(
            broken.evaluate(&fields),
            Err(RuleError::MissingKey(_))
        ));

        let unterminated = TemplateRule {
            expression: "d_({#0".into(),
        };
        assert!(matches!(
            unterminated.evaluate(&fields),
            Err(RuleError::InvalidValue(_))
        ));
    }

    #[test]
    fn line_dependent_rule_requires_a_line() {
        let t = particle("t", "mt", 2);
        let tbar = particle("tbar", "mt", 2);
        let g = particle("g", "0", 3);
        let participants = vec![tbar.clone(), t.clone(), g.clone()];
        let refs = [
            FieldRef {
                id: "ext1",
                momentum: "p1",
                particle: &tbar,
            },
            FieldRef {
                id: "2",
                momentum: "q1",
                particle: &t,
            },
            FieldRef {
                id: "3",
                momentum: "q2",
                particle: &g,
            },
        ];
        let rule = FermionVectorRule {
            coupling: "g".into(),
        };
        let without = FieldAssignment::new(&participants, refs);
        assert!(matches!(
            rule.evaluate(&without),
            Err(RuleError::MissingKey(_))
        ));
        let with = FieldAssignment::new(&participants, refs).with_line(Some(1));
        assert_eq!(
            rule.evaluate(&with).unwrap(),
            "(i_*g)*(g_(1,mu3))*(T(b3,colext1,col2))"
        );
    }

    #[test]
    fn scalar_and_fermion_propagators() {
        let phi = particle("phi", "m", 1);
        let ends = PropagatorAssignment {
            from: FieldRef {
                id: "2",
                momentum: "q1",
                particle: &phi,
            },
            to: FieldRef {
                id: "1",
                momentum: "-q1",
                particle: &phi,
            },
            momentum: "q1",
        };
        assert_eq!(
            ScalarPropagator {}.evaluate(&ends).unwrap(),
            "(i_)*(Den(q1,m))"
        );
        assert_eq!(
            FermionPropagator { color: true }.evaluate(&ends).unwrap(),
            "((i_)*(g(q1,x2,x1) + m*g(x2,x1))*(Den(q1,m)))*(d_(i2,i1))"
        );
        assert_eq!(
            TemplatePropagator {
                expression: "P({from},{to};{p},{m})".into()
            }
            .evaluate(&ends)
            .unwrap(),
            "P(2,1;q1,m)"
        );
    }
}
