pub mod rules;

use ahash::RandomState;
use color_eyre::{Report, Section};
use eyre::{eyre, WrapErr};
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use rules::{
    FieldAssignment, FieldRef, PropagatorAssignment, PropagatorRule, PropagatorRuleKind,
    RuleError, VertexRule, VertexRuleKind,
};

/// Suffix toggled to go from a particle name to its anti-particle name.
pub const ANTI_PARTICLE_SUFFIX: &str = "bar";

const PHI3_MODEL: &str = include_str!("../models/phi3.yaml");
const GHT_MODEL: &str = include_str!("../models/ght.yaml");

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Duplicate {kind} '{name}' in model '{model}'")]
    DuplicateDefinition {
        model: SmartString<LazyCompact>,
        kind: &'static str,
        name: SmartString<LazyCompact>,
    },
    #[error("Particle '{name}' not found in model '{model}'")]
    ParticleNotFound {
        model: SmartString<LazyCompact>,
        name: SmartString<LazyCompact>,
    },
    #[error("Parameter '{name}' not found in model '{model}'")]
    ParameterNotFound {
        model: SmartString<LazyCompact>,
        name: SmartString<LazyCompact>,
    },
    #[error("No {kind} rule for particles [{key}] in model '{model}'")]
    RuleNotFound {
        model: SmartString<LazyCompact>,
        kind: &'static str,
        key: String,
    },
    #[error("Interaction '{interaction}' in model '{model}' couples fermions but does not list the antifermion and the fermion first")]
    FermionSlots {
        model: SmartString<LazyCompact>,
        interaction: SmartString<LazyCompact>,
    },
    #[error("Could not load model: {0}")]
    ModelLoad(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableParameter {
    symbol: SmartString<LazyCompact>,
    #[serde(default)]
    name: Option<SmartString<LazyCompact>>,
    #[serde(default)]
    info: String,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    complex_conjugate: Option<SmartString<LazyCompact>>,
}

impl SerializableParameter {
    pub fn from_parameter(param: &Parameter) -> SerializableParameter {
        SerializableParameter {
            symbol: param.symbol.clone(),
            name: Some(param.name.clone()),
            info: param.info.clone(),
            value: param.value,
            complex_conjugate: Some(param.complex_conjugate.clone()),
        }
    }
}

/// A symbolic token of the theory. Its `symbol` is what ends up in expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub symbol: SmartString<LazyCompact>,
    pub name: SmartString<LazyCompact>,
    pub info: String,
    pub value: Option<f64>,
    pub complex_conjugate: SmartString<LazyCompact>,
}

impl Parameter {
    /// A real parameter whose name is its symbol.
    pub fn new(symbol: &str) -> Parameter {
        Parameter {
            symbol: symbol.into(),
            name: symbol.into(),
            info: String::new(),
            value: None,
            complex_conjugate: symbol.into(),
        }
    }

    pub fn from_serializable_parameter(param: &SerializableParameter) -> Parameter {
        Parameter {
            symbol: param.symbol.clone(),
            name: param.name.clone().unwrap_or_else(|| param.symbol.clone()),
            info: param.info.clone(),
            value: param.value,
            complex_conjugate: param
                .complex_conjugate
                .clone()
                .unwrap_or_else(|| param.symbol.clone()),
        }
    }

    pub fn is_real(&self) -> bool {
        self.complex_conjugate == self.symbol
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableParticle {
    name: SmartString<LazyCompact>,
    mass: SmartString<LazyCompact>,
    #[serde(default = "_default_spin")]
    spin: isize,
    #[serde(default)]
    self_conjugate: bool,
}

const fn _default_spin() -> isize {
    1
}

impl SerializableParticle {
    pub fn from_particle(particle: &Particle) -> SerializableParticle {
        SerializableParticle {
            name: particle.name.clone(),
            mass: particle.mass.name.clone(),
            spin: particle.spin,
            self_conjugate: particle.self_conjugate,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub name: SmartString<LazyCompact>,
    pub mass: Arc<Parameter>,
    /// Dimension of the spin state space, 2S+1.
    pub spin: isize,
    pub self_conjugate: bool,
}

impl Particle {
    pub fn from_serializable_particle(
        model: &Model,
        particle: &SerializableParticle,
    ) -> Result<Particle, ModelError> {
        Ok(Particle {
            name: particle.name.clone(),
            mass: model.get_parameter(&particle.mass)?,
            spin: particle.spin,
            self_conjugate: particle.self_conjugate,
        })
    }

    pub fn is_fermion(&self) -> bool {
        self.spin % 2 == 0
    }

    pub fn anti_particle_name(&self) -> SmartString<LazyCompact> {
        if self.self_conjugate {
            self.name.clone()
        } else if let Some(stripped) = self.name.strip_suffix(ANTI_PARTICLE_SUFFIX) {
            stripped.into()
        } else {
            let mut name = self.name.clone();
            name.push_str(ANTI_PARTICLE_SUFFIX);
            name
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableInteraction {
    #[serde(default)]
    name: Option<SmartString<LazyCompact>>,
    particles: Vec<SmartString<LazyCompact>>,
    rule: VertexRuleKind,
}

impl SerializableInteraction {
    pub fn from_interaction(interaction: &Interaction) -> SerializableInteraction {
        SerializableInteraction {
            name: Some(interaction.name.clone()),
            particles: interaction
                .particles
                .iter()
                .map(|p| p.name.clone())
                .collect(),
            rule: interaction.rule.clone(),
        }
    }
}

/// An unordered coupling of particles together with its Feynman rule.
#[derive(Debug, Clone)]
pub struct Interaction {
    /// Identity key, by default the particle names joined in definition order.
    pub name: SmartString<LazyCompact>,
    pub particles: Vec<Arc<Particle>>,
    pub rule: VertexRuleKind,
}

impl Interaction {
    pub fn from_serializable_interaction(
        model: &Model,
        interaction: &SerializableInteraction,
    ) -> Result<Interaction, ModelError> {
        let particles = interaction
            .particles
            .iter()
            .map(|name| model.get_particle(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Interaction {
            name: interaction
                .name
                .clone()
                .unwrap_or_else(|| joined_key(&interaction.particles).into()),
            particles,
            rule: interaction.rule.clone(),
        })
    }

    /// Order-independent lookup key.
    pub fn canonical_key(&self) -> String {
        canonical_key(self.particles.iter().map(|p| p.name.as_str()))
    }

    pub fn particle_names(&self) -> Vec<&str> {
        self.particles.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn generate(&self, fields: &FieldAssignment<'_>) -> Result<String, RuleError> {
        self.rule.evaluate(fields)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializablePropagator {
    #[serde(default)]
    name: Option<SmartString<LazyCompact>>,
    particles: [SmartString<LazyCompact>; 2],
    rule: PropagatorRuleKind,
}

impl SerializablePropagator {
    pub fn from_propagator(propagator: &Propagator) -> SerializablePropagator {
        SerializablePropagator {
            name: Some(propagator.name.clone()),
            particles: [
                propagator.particles[0].name.clone(),
                propagator.particles[1].name.clone(),
            ],
            rule: propagator.rule.clone(),
        }
    }
}

/// Like an [`Interaction`] with exactly two participants, except that their order
/// is the direction of the momentum flow and takes part in the lookup.
#[derive(Debug, Clone)]
pub struct Propagator {
    pub name: SmartString<LazyCompact>,
    pub particles: [Arc<Particle>; 2],
    pub rule: PropagatorRuleKind,
}

impl Propagator {
    pub fn from_serializable_propagator(
        model: &Model,
        propagator: &SerializablePropagator,
    ) -> Result<Propagator, ModelError> {
        Ok(Propagator {
            name: propagator
                .name
                .clone()
                .unwrap_or_else(|| joined_key(&propagator.particles).into()),
            particles: [
                model.get_particle(&propagator.particles[0])?,
                model.get_particle(&propagator.particles[1])?,
            ],
            rule: propagator.rule.clone(),
        })
    }

    pub fn from_particle(&self) -> &Arc<Particle> {
        &self.particles[0]
    }

    pub fn to_particle(&self) -> &Arc<Particle> {
        &self.particles[1]
    }

    pub fn ordered_key(&self) -> String {
        joined_key(&[&self.particles[0].name, &self.particles[1].name])
    }

    pub fn generate(&self, ends: &PropagatorAssignment<'_>) -> Result<String, RuleError> {
        self.rule.evaluate(ends)
    }
}

fn joined_key<S: AsRef<str>>(names: &[S]) -> String {
    names.iter().map(|n| n.as_ref()).join(",")
}

fn canonical_key<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names.into_iter().sorted_unstable().join(",")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableModel {
    pub name: SmartString<LazyCompact>,
    #[serde(default)]
    parameters: Vec<SerializableParameter>,
    #[serde(default)]
    particles: Vec<SerializableParticle>,
    #[serde(default)]
    interactions: Vec<SerializableInteraction>,
    #[serde(default)]
    propagators: Vec<SerializablePropagator>,
}

impl SerializableModel {
    pub fn from_file(file_path: impl AsRef<Path>) -> Result<SerializableModel, Report> {
        let file_path = file_path.as_ref();
        let f = File::open(file_path)
            .wrap_err_with(|| format!("Could not open model yaml file {}", file_path.display()))
            .suggestion("Does the path exist?")?;
        serde_yaml::from_reader(f)
            .map_err(|e| eyre!(format!("Error parsing model yaml: {}", e)))
            .suggestion("Is it a correct yaml file")
    }

    pub fn from_yaml_str(yaml_str: &str) -> Result<SerializableModel, ModelError> {
        serde_yaml::from_str(yaml_str)
            .map_err(|e| ModelError::ModelLoad(format!("Error parsing model yaml: {}", e)))
    }

    pub fn from_model(model: &Model) -> SerializableModel {
        SerializableModel {
            name: model.name.clone(),
            parameters: model
                .parameters
                .iter()
                .map(|p| SerializableParameter::from_parameter(p))
                .collect(),
            particles: model
                .particles
                .iter()
                .map(|p| SerializableParticle::from_particle(p))
                .collect(),
            interactions: model
                .interactions
                .iter()
                .map(|i| SerializableInteraction::from_interaction(i))
                .collect(),
            propagators: model
                .propagators
                .iter()
                .map(|p| SerializablePropagator::from_propagator(p))
                .collect(),
        }
    }
}

type NameMap = HashMap<SmartString<LazyCompact>, usize, RandomState>;

/// Read-only description of a theory. Everything is resolved once at
/// construction; afterwards only relabeling of identity keys is possible.
#[derive(Debug, Clone)]
pub struct Model {
    pub name: SmartString<LazyCompact>,
    parameters: Vec<Arc<Parameter>>,
    particles: Vec<Arc<Particle>>,
    interactions: Vec<Arc<Interaction>>,
    propagators: Vec<Arc<Propagator>>,
    parameter_name_to_position: NameMap,
    particle_name_to_position: NameMap,
    interaction_name_to_position: NameMap,
    interaction_canonical_key_to_position: HashMap<String, usize, RandomState>,
    propagator_name_to_position: NameMap,
    propagator_ordered_key_to_position: HashMap<String, usize, RandomState>,
}

impl Default for Model {
    fn default() -> Self {
        Model {
            name: SmartString::<LazyCompact>::from("ModelNotLoaded"),
            parameters: vec![],
            particles: vec![],
            interactions: vec![],
            propagators: vec![],
            parameter_name_to_position: NameMap::default(),
            particle_name_to_position: NameMap::default(),
            interaction_name_to_position: NameMap::default(),
            interaction_canonical_key_to_position: HashMap::default(),
            propagator_name_to_position: NameMap::default(),
            propagator_ordered_key_to_position: HashMap::default(),
        }
    }
}

impl Model {
    pub fn is_empty(&self) -> bool {
        self.name == "ModelNotLoaded" || self.particles.is_empty()
    }

    fn duplicate(&self, kind: &'static str, name: &str) -> ModelError {
        ModelError::DuplicateDefinition {
            model: self.name.clone(),
            kind,
            name: name.into(),
        }
    }

    pub fn from_serializable_model(
        serializable_model: SerializableModel,
    ) -> Result<Model, ModelError> {
        let mut model: Model = Model {
            name: serializable_model.name,
            ..Model::default()
        };

        for (i_param, serializable_param) in serializable_model.parameters.iter().enumerate() {
            let parameter = Arc::new(Parameter::from_serializable_parameter(serializable_param));
            if model
                .parameter_name_to_position
                .insert(parameter.name.clone(), i_param)
                .is_some()
            {
                return Err(model.duplicate("parameter", &parameter.name));
            }
            model.parameters.push(parameter);
        }

        for (i_part, serializable_particle) in serializable_model.particles.iter().enumerate() {
            let particle = Arc::new(Particle::from_serializable_particle(
                &model,
                serializable_particle,
            )?);
            if model
                .particle_name_to_position
                .insert(particle.name.clone(), i_part)
                .is_some()
            {
                return Err(model.duplicate("particle", &particle.name));
            }
            model.particles.push(particle);
        }

        for (i_int, serializable_interaction) in
            serializable_model.interactions.iter().enumerate()
        {
            let interaction = Arc::new(Interaction::from_serializable_interaction(
                &model,
                serializable_interaction,
            )?);
            model.check_couplings(interaction.rule.couplings())?;
            model.check_fermion_slots(&interaction)?;
            if model
                .interaction_name_to_position
                .insert(interaction.name.clone(), i_int)
                .is_some()
            {
                return Err(model.duplicate("interaction", &interaction.name));
            }
            if model
                .interaction_canonical_key_to_position
                .insert(interaction.canonical_key(), i_int)
                .is_some()
            {
                return Err(model.duplicate("interaction", &interaction.canonical_key()));
            }
            model.interactions.push(interaction);
        }

        for (i_prop, serializable_propagator) in serializable_model.propagators.iter().enumerate()
        {
            let propagator = Arc::new(Propagator::from_serializable_propagator(
                &model,
                serializable_propagator,
            )?);
            if model
                .propagator_name_to_position
                .insert(propagator.name.clone(), i_prop)
                .is_some()
            {
                return Err(model.duplicate("propagator", &propagator.name));
            }
            if model
                .propagator_ordered_key_to_position
                .insert(propagator.ordered_key(), i_prop)
                .is_some()
            {
                return Err(model.duplicate("propagator", &propagator.ordered_key()));
            }
            model.propagators.push(propagator);
        }

        debug!(
            "Loaded model '{}': {} parameters, {} particles, {} interactions, {} propagators",
            model.name,
            model.parameters.len(),
            model.particles.len(),
            model.interactions.len(),
            model.propagators.len()
        );

        Ok(model)
    }

    /// Fermion lines are threaded through participant slots 0 and 1.
    fn check_fermion_slots(&self, interaction: &Interaction) -> Result<(), ModelError> {
        let particles = &interaction.particles;
        if !particles.iter().any(|p| p.is_fermion()) {
            return Ok(());
        }
        if particles.len() >= 2 && particles[0].is_fermion() && particles[1].is_fermion() {
            Ok(())
        } else {
            Err(ModelError::FermionSlots {
                model: self.name.clone(),
                interaction: interaction.name.clone(),
            })
        }
    }

    fn check_couplings(&self, couplings: Vec<&str>) -> Result<(), ModelError> {
        for coupling in couplings {
            if !self.parameters.iter().any(|p| p.symbol.as_str() == coupling) {
                return Err(ModelError::ParameterNotFound {
                    model: self.name.clone(),
                    name: coupling.into(),
                });
            }
        }
        Ok(())
    }

    pub fn to_serializable(&self) -> SerializableModel {
        SerializableModel::from_model(self)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.to_serializable())
    }

    pub fn from_file(file_path: impl AsRef<Path>) -> Result<Model, Report> {
        let serializable = SerializableModel::from_file(file_path)?;
        Ok(Model::from_serializable_model(serializable)?)
    }

    pub fn from_yaml_str(yaml_str: &str) -> Result<Model, ModelError> {
        SerializableModel::from_yaml_str(yaml_str).and_then(Model::from_serializable_model)
    }

    /// One of the theories shipped with the crate: `phi3` or `ght`.
    pub fn builtin(name: &str) -> Result<Model, ModelError> {
        match name {
            "phi3" => Model::from_yaml_str(PHI3_MODEL),
            "ght" => Model::from_yaml_str(GHT_MODEL),
            other => Err(ModelError::ModelLoad(format!(
                "no built-in model named '{}'",
                other
            ))),
        }
    }

    pub fn parameters(&self) -> &[Arc<Parameter>] {
        &self.parameters
    }

    pub fn particles(&self) -> &[Arc<Particle>] {
        &self.particles
    }

    pub fn interactions(&self) -> &[Arc<Interaction>] {
        &self.interactions
    }

    pub fn propagators(&self) -> &[Arc<Propagator>] {
        &self.propagators
    }

    #[inline]
    pub fn get_particle(&self, name: &str) -> Result<Arc<Particle>, ModelError> {
        self.particle_name_to_position
            .get(name)
            .map(|&position| self.particles[position].clone())
            .ok_or_else(|| ModelError::ParticleNotFound {
                model: self.name.clone(),
                name: name.into(),
            })
    }

    #[inline]
    pub fn get_parameter(&self, name: &str) -> Result<Arc<Parameter>, ModelError> {
        self.parameter_name_to_position
            .get(name)
            .map(|&position| self.parameters[position].clone())
            .ok_or_else(|| ModelError::ParameterNotFound {
                model: self.name.clone(),
                name: name.into(),
            })
    }

    pub fn get_anti_particle(&self, particle: &Particle) -> Result<Arc<Particle>, ModelError> {
        self.get_particle(&particle.anti_particle_name())
    }

    /// Resolve the interaction coupling exactly this multiset of particles,
    /// regardless of the order the names are given in.
    pub fn get_interaction<S: AsRef<str>>(
        &self,
        particle_names: &[S],
    ) -> Result<Arc<Interaction>, ModelError> {
        let key = canonical_key(particle_names.iter().map(|n| n.as_ref()));
        self.interaction_canonical_key_to_position
            .get(&key)
            .map(|&position| self.interactions[position].clone())
            .ok_or_else(|| ModelError::RuleNotFound {
                model: self.name.clone(),
                kind: "interaction",
                key: joined_key(particle_names),
            })
    }

    pub fn get_interaction_by_name(&self, name: &str) -> Option<Arc<Interaction>> {
        self.interaction_name_to_position
            .get(name)
            .map(|&position| self.interactions[position].clone())
    }

    /// Resolve the propagator whose momentum flows from `from` to `to`.
    /// The reversed pair is a different entry.
    pub fn get_propagator(&self, from: &str, to: &str) -> Result<Arc<Propagator>, ModelError> {
        let key = joined_key(&[from, to]);
        match self.propagator_ordered_key_to_position.get(&key) {
            Some(&position) => Ok(self.propagators[position].clone()),
            None => Err(ModelError::RuleNotFound {
                model: self.name.clone(),
                kind: "propagator",
                key,
            }),
        }
    }

    pub fn get_propagator_by_name(&self, name: &str) -> Option<Arc<Propagator>> {
        self.propagator_name_to_position
            .get(name)
            .map(|&position| self.propagators[position].clone())
    }

    /// Give an interaction a new identity key. Its participants, rule and
    /// lookup behaviour are unchanged.
    pub fn relabel_interaction(&mut self, old: &str, new: &str) -> Result<(), ModelError> {
        if self.interaction_name_to_position.contains_key(new) {
            return Err(self.duplicate("interaction", new));
        }
        let position = self.interaction_name_to_position.remove(old).ok_or_else(|| {
            ModelError::RuleNotFound {
                model: self.name.clone(),
                kind: "interaction",
                key: old.to_string(),
            }
        })?;
        let mut relabeled = self.interactions[position].as_ref().clone();
        relabeled.name = new.into();
        self.interactions[position] = Arc::new(relabeled);
        self.interaction_name_to_position.insert(new.into(), position);
        Ok(())
    }

    pub fn relabel_propagator(&mut self, old: &str, new: &str) -> Result<(), ModelError> {
        if self.propagator_name_to_position.contains_key(new) {
            return Err(self.duplicate("propagator", new));
        }
        let position = self.propagator_name_to_position.remove(old).ok_or_else(|| {
            ModelError::RuleNotFound {
                model: self.name.clone(),
                kind: "propagator",
                key: old.to_string(),
            }
        })?;
        let mut relabeled = self.propagators[position].as_ref().clone();
        relabeled.name = new.into();
        self.propagators[position] = Arc::new(relabeled);
        self.propagator_name_to_position.insert(new.into(), position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABC: &str = r#"
name: abc
parameters:
  - symbol: m
  - symbol: "0"
    name: zero
particles:
  - { name: A, mass: m }
  - { name: B, mass: zero, spin: 3 }
  - { name: C, mass: m }
interactions:
  - particles: [A, B, C]
    rule: { kind: constant, expression: "abc" }
  - particles: [A, A, C]
    rule: { kind: constant, expression: "aac" }
propagators:
  - particles: [A, C]
    rule: { kind: scalar }
  - particles: [B, B]
    rule: { kind: vector }
"#;

    fn abc() -> Model {
        Model::from_yaml_str(ABC).unwrap()
    }

    #[test]
    fn interaction_lookup_is_permutation_invariant() {
        let model = abc();
        let abc = model.get_interaction(&["A", "B", "C"]).unwrap();
        for names in [["C", "B", "A"], ["B", "A", "C"], ["C", "A", "B"]] {
            let found = model.get_interaction(&names).unwrap();
            assert!(Arc::ptr_eq(&found, &abc));
            assert_eq!(found.name, "A,B,C");
        }
        let aac = model.get_interaction(&["C", "A", "A"]).unwrap();
        assert_eq!(aac.name, "A,A,C");
        assert!(!Arc::ptr_eq(&aac, &abc));
    }

    #[test]
    fn missing_interaction_leaves_registry_untouched() {
        let model = abc();
        let before = model.interactions().len();
        let err = model.get_interaction(&["A", "B", "B"]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::RuleNotFound {
                kind: "interaction",
                ..
            }
        ));
        assert!(err.to_string().contains("A,B,B"));
        assert_eq!(model.interactions().len(), before);
        assert!(model.get_interaction(&["A", "B", "C"]).is_ok());
    }

    #[test]
    fn propagator_lookup_is_ordered() {
        let model = abc();
        assert_eq!(model.get_propagator("A", "C").unwrap().name, "A,C");
        assert!(matches!(
            model.get_propagator("C", "A"),
            Err(ModelError::RuleNotFound {
                kind: "propagator",
                ..
            })
        ));
        assert!(model.get_propagator("B", "B").is_ok());
    }

    #[test]
    fn duplicates_are_rejected() {
        let permuted = ABC.replace("particles: [A, A, C]", "particles: [C, B, A]");
        assert!(matches!(
            Model::from_yaml_str(&permuted),
            Err(ModelError::DuplicateDefinition {
                kind: "interaction",
                ..
            })
        ));

        let twice = ABC.replace("{ name: C, mass: m }", "{ name: A, mass: m }");
        assert!(matches!(
            Model::from_yaml_str(&twice),
            Err(ModelError::DuplicateDefinition {
                kind: "particle",
                ..
            })
        ));

        let reversed_twice = ABC.replace("particles: [B, B]", "particles: [A, C]");
        assert!(matches!(
            Model::from_yaml_str(&reversed_twice),
            Err(ModelError::DuplicateDefinition {
                kind: "propagator",
                ..
            })
        ));
    }

    #[test]
    fn unknown_references_fail_construction() {
        let bad_mass = ABC.replace("{ name: C, mass: m }", "{ name: C, mass: mc }");
        assert!(matches!(
            Model::from_yaml_str(&bad_mass),
            Err(ModelError::ParameterNotFound { .. })
        ));

        let bad_particle = ABC.replace("particles: [A, A, C]", "particles: [A, A, D]");
        assert!(matches!(
            Model::from_yaml_str(&bad_particle),
            Err(ModelError::ParticleNotFound { .. })
        ));
    }

    #[test]
    fn fermion_interactions_list_their_fermions_first() {
        let ght = GHT_MODEL.replace(
            "particles: [tbar, t, g]\n    rule: { kind: fermion_vector",
            "particles: [g, tbar, t]\n    rule: { kind: fermion_vector",
        );
        assert_ne!(ght, GHT_MODEL);
        let err = Model::from_yaml_str(&ght).unwrap_err();
        assert_eq!(
            err,
            ModelError::FermionSlots {
                model: "ght".into(),
                interaction: "g,tbar,t".into(),
            }
        );

        let ght = GHT_MODEL.replace("particles: [tbar, t, H]", "particles: [tbar, H, t]");
        assert!(matches!(
            Model::from_yaml_str(&ght),
            Err(ModelError::FermionSlots { .. })
        ));
    }

    #[test]
    fn relabeling_keeps_content_and_lookup() {
        let mut model = abc();
        model.relabel_interaction("A,B,C", "vabc").unwrap();
        let found = model.get_interaction(&["B", "C", "A"]).unwrap();
        assert_eq!(found.name, "vabc");
        assert_eq!(found.particle_names(), vec!["A", "B", "C"]);
        assert!(model.get_interaction_by_name("A,B,C").is_none());
        assert!(model.get_interaction_by_name("vabc").is_some());

        assert!(matches!(
            model.relabel_interaction("A,A,C", "vabc"),
            Err(ModelError::DuplicateDefinition { .. })
        ));
        model.relabel_propagator("A,C", "prop_ac").unwrap();
        assert_eq!(model.get_propagator("A", "C").unwrap().name, "prop_ac");
    }

    #[test]
    fn anti_particles_toggle_suffix() {
        let model = Model::builtin("ght").unwrap();
        let t = model.get_particle("t").unwrap();
        let tbar = model.get_anti_particle(&t).unwrap();
        assert_eq!(tbar.name, "tbar");
        assert_eq!(model.get_anti_particle(&tbar).unwrap().name, "t");
        let g = model.get_particle("g").unwrap();
        assert_eq!(g.anti_particle_name(), "g");
        assert!(t.is_fermion());
        assert!(!g.is_fermion());
        assert!(model.get_parameter("mt").unwrap().is_real());
    }

    #[test]
    fn builtin_models_round_trip_through_yaml() {
        for name in ["phi3", "ght"] {
            let model = Model::builtin(name).unwrap();
            let again = Model::from_yaml_str(&model.to_yaml().unwrap()).unwrap();
            assert_eq!(again.particles().len(), model.particles().len());
            assert_eq!(again.interactions().len(), model.interactions().len());
            assert_eq!(again.propagators().len(), model.propagators().len());
        }
        assert!(matches!(
            Model::builtin("sm"),
            Err(ModelError::ModelLoad(_))
        ));
    }
}
