//! Identifiers of base-namespace nodes the builders and projectors treat
//! specially. All live in namespace 0.

use crate::model::ModelingRule;

pub const UA_NAMESPACE_URI: &str = "http://opcfoundation.org/UA/";

// ── Reference types ──
pub const HAS_INTERFACE: &str = "i=17603";
pub const HAS_MODELLING_RULE: &str = "i=37";
pub const HAS_ENCODING: &str = "i=38";
pub const HAS_TYPE_DEFINITION: &str = "i=40";
pub const GENERATES_EVENT: &str = "i=41";
pub const HAS_SUBTYPE: &str = "i=45";
pub const HAS_PROPERTY: &str = "i=46";
pub const HAS_COMPONENT: &str = "i=47";
pub const HAS_ORDERED_COMPONENT: &str = "i=49";
pub const ORGANIZES: &str = "i=35";

// ── Types ──
pub const BASE_DATA_TYPE: &str = "i=24";
pub const STRUCTURE: &str = "i=22";
pub const ENUMERATION: &str = "i=29";
pub const RANGE: &str = "i=884";
pub const EU_INFORMATION: &str = "i=887";
pub const BASE_OBJECT_TYPE: &str = "i=58";
pub const FOLDER_TYPE: &str = "i=61";
pub const BASE_VARIABLE_TYPE: &str = "i=62";
pub const BASE_DATA_VARIABLE_TYPE: &str = "i=63";
pub const PROPERTY_TYPE: &str = "i=68";
pub const BASE_EVENT_TYPE: &str = "i=2041";
pub const BASE_INTERFACE_TYPE: &str = "i=17602";

// ── Modelling rules ──
pub const MANDATORY: &str = "i=78";
pub const OPTIONAL: &str = "i=80";
pub const EXPOSES_ITS_ARRAY: &str = "i=83";
pub const OPTIONAL_PLACEHOLDER: &str = "i=11508";
pub const MANDATORY_PLACEHOLDER: &str = "i=11510";

/// Browse names of the reference types given aliases on export, in the
/// order they are written.
pub const REFERENCE_ALIASES: &[(&str, &str)] = &[
    ("Organizes", ORGANIZES),
    ("HasModellingRule", HAS_MODELLING_RULE),
    ("HasEncoding", HAS_ENCODING),
    ("HasTypeDefinition", HAS_TYPE_DEFINITION),
    ("GeneratesEvent", GENERATES_EVENT),
    ("HasSubtype", HAS_SUBTYPE),
    ("HasProperty", HAS_PROPERTY),
    ("HasComponent", HAS_COMPONENT),
    ("HasOrderedComponent", HAS_ORDERED_COMPONENT),
    ("HasInterface", HAS_INTERFACE),
];

/// Hierarchical references the builders classify into child-edge roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnownReference {
    Component,
    Property,
    Interface,
    GeneratesEvent,
    Subtype,
    TypeDefinition,
    ModellingRule,
}

impl WellKnownReference {
    pub fn classify(base_identifier: &str) -> Option<Self> {
        match base_identifier {
            HAS_COMPONENT | HAS_ORDERED_COMPONENT => Some(Self::Component),
            HAS_PROPERTY => Some(Self::Property),
            HAS_INTERFACE => Some(Self::Interface),
            GENERATES_EVENT => Some(Self::GeneratesEvent),
            HAS_SUBTYPE => Some(Self::Subtype),
            HAS_TYPE_DEFINITION => Some(Self::TypeDefinition),
            HAS_MODELLING_RULE => Some(Self::ModellingRule),
            _ => None,
        }
    }
}

pub fn modeling_rule_id(rule: ModelingRule) -> &'static str {
    match rule {
        ModelingRule::Mandatory => MANDATORY,
        ModelingRule::Optional => OPTIONAL,
        ModelingRule::ExposesItsArray => EXPOSES_ITS_ARRAY,
        ModelingRule::OptionalPlaceholder => OPTIONAL_PLACEHOLDER,
        ModelingRule::MandatoryPlaceholder => MANDATORY_PLACEHOLDER,
    }
}

pub fn modeling_rule_for(base_identifier: &str) -> Option<ModelingRule> {
    match base_identifier {
        MANDATORY => Some(ModelingRule::Mandatory),
        OPTIONAL => Some(ModelingRule::Optional),
        EXPOSES_ITS_ARRAY => Some(ModelingRule::ExposesItsArray),
        OPTIONAL_PLACEHOLDER => Some(ModelingRule::OptionalPlaceholder),
        MANDATORY_PLACEHOLDER => Some(ModelingRule::MandatoryPlaceholder),
        _ => None,
    }
}

/// Alias name for a base reference type, if it has one.
pub fn alias_for(base_identifier: &str) -> Option<&'static str> {
    REFERENCE_ALIASES
        .iter()
        .find(|(_, id)| *id == base_identifier)
        .map(|(name, _)| *name)
}
