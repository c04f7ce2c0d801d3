//! Graph → typed-library schema document.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{BatchWarning, Diagnostics, ModelError, Result};
use crate::model::{
    ChildRole, DataTypeDefinition, ModelingRule, NamespaceId, Node, NodeGraph, NodeKind, NodeRef,
};
use crate::schema::{
    library_name, semantic_version, EnumerationType, EnumerationValue, Library, QualifiedName,
    SchemaAttribute, SchemaComposition, SchemaDocument, SchemaType, TypeCategory,
};
use crate::wire::well_known::{self, UA_NAMESPACE_URI};

/// How a variable's data type surfaces in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueShape {
    Scalar,
    Enumeration,
    Structure,
}

pub struct SchemaProjector<'g> {
    graph: &'g NodeGraph,
    existing: Option<&'g SchemaDocument>,
    timestamp: DateTime<Utc>,
}

impl<'g> SchemaProjector<'g> {
    pub fn new(graph: &'g NodeGraph) -> Self {
        Self {
            graph,
            existing: None,
            timestamp: Utc::now(),
        }
    }

    /// Types already present in `schema` are not emitted again.
    pub fn with_existing(mut self, schema: &'g SchemaDocument) -> Self {
        self.existing = Some(schema);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn project(
        &self,
        namespace: NamespaceId,
        diagnostics: &mut Diagnostics,
    ) -> Result<SchemaDocument> {
        let ns = self.graph.namespace(namespace).ok_or_else(|| {
            ModelError::InvalidDocument(format!("unknown namespace {:?}", namespace))
        })?;

        let mut doc = SchemaDocument::new(&ns.uri, self.timestamp);
        let mut touched = BTreeSet::from([ns.uri.clone()]);
        let mut skipped = 0usize;

        for node in ns.nodes() {
            let name = self.qualified_node(node);
            let known = self.existing.is_some_and(|d| d.contains(&name)) || doc.contains(&name);
            match (node.kind(), node.data_type_definition()) {
                (NodeKind::ObjectType | NodeKind::Interface, _) if known => skipped += 1,
                (NodeKind::DataType, Some(_)) if known => skipped += 1,
                (NodeKind::ObjectType | NodeKind::Interface, _) => {
                    let ty = self.object_type(node, name, &mut touched)?;
                    doc.types.push(ty);
                }
                (NodeKind::DataType, Some(DataTypeDefinition::Structure(fields))) => {
                    let mut ty = self.type_header(node, name, TypeCategory::Structure, &mut touched);
                    for f in fields {
                        let member = Member {
                            name: f.name.clone(),
                            data_type: Some(f.data_type),
                            is_array: matches!(f.value_rank, Some(r) if r >= 0),
                            is_required: !f.is_optional,
                            description: f.description.clone(),
                        };
                        self.push_member(&mut ty, member, &mut touched);
                    }
                    doc.types.push(ty);
                }
                (NodeKind::DataType, Some(DataTypeDefinition::Enumeration(fields))) => {
                    doc.enumeration_types.push(EnumerationType {
                        name,
                        description: node.description.clone(),
                        values: fields
                            .iter()
                            .map(|f| EnumerationValue {
                                name: f.name.clone(),
                                value: f.value,
                                description: f.description.clone(),
                            })
                            .collect(),
                    });
                }
                _ => {}
            }
        }
        if skipped > 0 {
            debug!(namespace = %ns.uri, skipped, "types already present in target schema");
        }

        for uri in touched {
            let (version, publication_date, raw) = match self.graph.namespace_by_uri(&uri) {
                Some(n) => (n.version.as_deref(), n.publication_date, n.version.clone()),
                None => (None, None, None),
            };
            let (semver, numeric) = semantic_version(version);
            if !numeric {
                diagnostics.warn(BatchWarning::SchemaVersion {
                    namespace: uri.clone(),
                    version: raw.unwrap_or_default(),
                });
            }
            doc.libraries.push(Library {
                name: library_name(&uri),
                namespace_uri: uri,
                version: semver,
                publication_date,
            });
        }

        info!(
            namespace = %ns.uri,
            types = doc.types.len(),
            enumerations = doc.enumeration_types.len(),
            "projected namespace to schema"
        );
        Ok(doc)
    }

    fn qualified_node(&self, node: &Node) -> QualifiedName {
        QualifiedName::new(self.graph.uri_of(node.handle), node.name())
    }

    fn qualified(&self, r: NodeRef, touched: &mut BTreeSet<String>) -> Option<QualifiedName> {
        let node = self.graph.get(r)?;
        touched.insert(self.graph.uri_of(r).to_string());
        Some(self.qualified_node(node))
    }

    fn type_header(
        &self,
        node: &Node,
        name: QualifiedName,
        category: TypeCategory,
        touched: &mut BTreeSet<String>,
    ) -> SchemaType {
        let super_types = self
            .graph
            .super_chain(node.handle)
            .into_iter()
            .filter_map(|r| self.qualified(r, touched))
            .collect();
        SchemaType {
            name,
            category,
            is_abstract: node.is_abstract(),
            super_types,
            interfaces: Vec::new(),
            description: node.description.clone(),
            attributes: Vec::new(),
            compositions: Vec::new(),
        }
    }

    fn object_type(
        &self,
        node: &Node,
        name: QualifiedName,
        touched: &mut BTreeSet<String>,
    ) -> Result<SchemaType> {
        let category = if node.kind() == NodeKind::Interface {
            TypeCategory::Interface
        } else {
            TypeCategory::ObjectType
        };
        let mut ty = self.type_header(node, name, category, touched);
        ty.interfaces = node
            .children
            .get(ChildRole::Interface)
            .iter()
            .filter_map(|r| self.qualified(*r, touched))
            .collect();

        for (role, r) in node.children.iter() {
            let child = self.graph.get(r).ok_or_else(|| {
                ModelError::InvalidDocument(format!(
                    "child {} of {} was discarded",
                    self.graph.qualified(r),
                    self.graph.qualified(node.handle)
                ))
            })?;
            let is_required = matches!(
                child.instance().and_then(|i| i.modeling_rule),
                Some(ModelingRule::Mandatory | ModelingRule::MandatoryPlaceholder)
            );
            match role {
                ChildRole::Property | ChildRole::DataVariable => {
                    let Some(v) = child.variable() else {
                        continue;
                    };
                    let member = Member {
                        name: child.name().to_string(),
                        data_type: v.data_type,
                        is_array: matches!(v.value_rank, Some(r) if r >= 0),
                        is_required,
                        description: child.description.clone(),
                    };
                    self.push_member(&mut ty, member, touched);
                }
                ChildRole::Object => {
                    let Some(type_name) = child
                        .type_definition()
                        .and_then(|td| self.qualified(td, touched))
                    else {
                        debug!(child = %self.graph.qualified(r), "object child without type definition skipped");
                        continue;
                    };
                    ty.compositions.push(SchemaComposition {
                        name: child.name().to_string(),
                        type_name,
                        is_array: false,
                        is_required,
                        description: child.description.clone(),
                    });
                }
                ChildRole::Method | ChildRole::Interface | ChildRole::Event => {}
            }
        }
        Ok(ty)
    }

    fn push_member(&self, ty: &mut SchemaType, member: Member, touched: &mut BTreeSet<String>) {
        let (data_type, shape) = match member.data_type {
            Some(dt) => match self.qualified(dt, touched) {
                Some(name) => (name, self.shape(dt)),
                None => (base_data_type(), ValueShape::Scalar),
            },
            None => (base_data_type(), ValueShape::Scalar),
        };
        if shape == ValueShape::Structure {
            ty.compositions.push(SchemaComposition {
                name: member.name,
                type_name: data_type,
                is_array: member.is_array,
                is_required: member.is_required,
                description: member.description,
            });
        } else {
            ty.attributes.push(SchemaAttribute {
                name: member.name,
                data_type,
                is_enumeration: shape == ValueShape::Enumeration,
                is_array: member.is_array,
                is_required: member.is_required,
                description: member.description,
            });
        }
    }

    fn shape(&self, data_type: NodeRef) -> ValueShape {
        match self.graph.get(data_type).and_then(|n| n.data_type_definition()) {
            Some(DataTypeDefinition::Structure(_)) => return ValueShape::Structure,
            Some(DataTypeDefinition::Enumeration(_)) => return ValueShape::Enumeration,
            None => {}
        }
        let descends = |base: &str| {
            self.graph
                .lookup(UA_NAMESPACE_URI, base)
                .is_some_and(|b| self.graph.is_subtype_of(data_type, b))
        };
        if descends(well_known::STRUCTURE) {
            ValueShape::Structure
        } else if descends(well_known::ENUMERATION) {
            ValueShape::Enumeration
        } else {
            ValueShape::Scalar
        }
    }
}

struct Member {
    name: String,
    data_type: Option<NodeRef>,
    is_array: bool,
    is_required: bool,
    description: Option<String>,
}

fn base_data_type() -> QualifiedName {
    QualifiedName::new(UA_NAMESPACE_URI, "BaseDataType")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build, BASE, PUMPS};
    use pretty_assertions::assert_eq;

    const SHAPES: &str = r#"<UANodeSet>
  <NamespaceUris><Uri>urn:shapes</Uri></NamespaceUris>
  <Models><Model ModelUri="urn:shapes" Version="draft" /></Models>
  <UADataType NodeId="ns=1;i=1" BrowseName="1:Point">
    <References><Reference ReferenceType="i=45" IsForward="false">i=22</Reference></References>
    <Definition Name="1:Point">
      <Field Name="X" DataType="i=11" />
      <Field Name="Y" DataType="i=11" IsOptional="true" />
    </Definition>
  </UADataType>
  <UADataType NodeId="ns=1;i=2" BrowseName="1:Colour">
    <References><Reference ReferenceType="i=45" IsForward="false">i=24</Reference></References>
    <Definition Name="1:Colour">
      <Field Name="Red" Value="1" />
      <Field Name="Blue" Value="2" />
    </Definition>
  </UADataType>
  <UAObjectType NodeId="ns=1;i=10" BrowseName="1:ShapeType">
    <References>
      <Reference ReferenceType="i=45" IsForward="false">i=58</Reference>
      <Reference ReferenceType="i=47">ns=1;i=11</Reference>
      <Reference ReferenceType="i=46">ns=1;i=12</Reference>
      <Reference ReferenceType="i=47">ns=1;i=13</Reference>
    </References>
  </UAObjectType>
  <UAVariable NodeId="ns=1;i=11" BrowseName="1:Origin" ParentNodeId="ns=1;i=10" DataType="ns=1;i=1">
    <References>
      <Reference ReferenceType="i=40">i=63</Reference>
      <Reference ReferenceType="i=37">i=78</Reference>
    </References>
  </UAVariable>
  <UAVariable NodeId="ns=1;i=12" BrowseName="1:Fill" ParentNodeId="ns=1;i=10" DataType="ns=1;i=2" ValueRank="1">
    <References><Reference ReferenceType="i=40">i=68</Reference></References>
  </UAVariable>
  <UAObject NodeId="ns=1;i=13" BrowseName="1:Anchor" ParentNodeId="ns=1;i=10">
    <References><Reference ReferenceType="i=40">i=58</Reference></References>
  </UAObject>
</UANodeSet>"#;

    fn stamp() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn project(xml: &str, uri: &str) -> (SchemaDocument, Diagnostics) {
        let (graph, _) = build(&[BASE, xml]);
        let id = graph.namespace_id(uri).unwrap();
        let mut diags = Diagnostics::new();
        let doc = SchemaProjector::new(&graph)
            .at(stamp())
            .project(id, &mut diags)
            .unwrap();
        (doc, diags)
    }

    #[test]
    fn object_types_flatten_super_chain() {
        let (doc, diags) = project(PUMPS, "urn:pumps");
        assert!(diags.is_empty());
        assert_eq!(doc.meta.export_namespace, "urn:pumps");
        let big = doc
            .find_type(&QualifiedName::new("urn:pumps", "BigPumpType"))
            .unwrap();
        assert_eq!(
            big.super_types,
            vec![
                QualifiedName::new("urn:pumps", "PumpType"),
                QualifiedName::new(UA_NAMESPACE_URI, "BaseObjectType"),
            ]
        );
        let names: Vec<_> = big.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Capacity"]);

        let pump = doc
            .find_type(&QualifiedName::new("urn:pumps", "PumpType"))
            .unwrap();
        let serial = pump.attributes.iter().find(|a| a.name == "Serial").unwrap();
        assert!(serial.is_required);
        assert_eq!(serial.data_type, QualifiedName::new(UA_NAMESPACE_URI, "Double"));

        let iface = doc
            .find_type(&QualifiedName::new("urn:pumps", "IMaintainable"))
            .unwrap();
        assert_eq!(iface.category, TypeCategory::Interface);

        let libs: Vec<_> = doc.libraries.iter().map(|l| (l.name.as_str(), l.version.as_str())).collect();
        assert_eq!(libs, vec![("opcfoundation.org/UA", "1.04.0"), ("pumps", "1.0.0")]);
    }

    #[test]
    fn structures_nest_and_enumerations_stay_leaves() {
        let (doc, diags) = project(SHAPES, "urn:shapes");
        assert_eq!(diags.warnings().len(), 1);

        let shape = doc
            .find_type(&QualifiedName::new("urn:shapes", "ShapeType"))
            .unwrap();
        let comps: Vec<_> = shape
            .compositions
            .iter()
            .map(|c| (c.name.as_str(), c.type_name.name(), c.is_required))
            .collect();
        assert_eq!(
            comps,
            vec![("Anchor", "BaseObjectType", false), ("Origin", "Point", true)]
        );
        assert_eq!(shape.attributes.len(), 1);
        let fill = &shape.attributes[0];
        assert!(fill.is_enumeration);
        assert!(fill.is_array);

        let point = doc
            .find_type(&QualifiedName::new("urn:shapes", "Point"))
            .unwrap();
        assert_eq!(point.category, TypeCategory::Structure);
        let required: Vec<_> = point.attributes.iter().map(|a| (a.name.as_str(), a.is_required)).collect();
        assert_eq!(required, vec![("X", true), ("Y", false)]);

        let colour = doc
            .find_enumeration(&QualifiedName::new("urn:shapes", "Colour"))
            .unwrap();
        assert_eq!(colour.values.len(), 2);
        assert_eq!(colour.values[1].value, 2);
    }

    #[test]
    fn existing_types_are_not_emitted_again() {
        let (first, _) = project(PUMPS, "urn:pumps");
        let (graph, _) = build(&[BASE, PUMPS]);
        let id = graph.namespace_id("urn:pumps").unwrap();
        let mut diags = Diagnostics::new();
        let again = SchemaProjector::new(&graph)
            .with_existing(&first)
            .at(stamp())
            .project(id, &mut diags)
            .unwrap();
        assert!(again.types.is_empty());
        assert!(again.enumeration_types.is_empty());
    }
}
