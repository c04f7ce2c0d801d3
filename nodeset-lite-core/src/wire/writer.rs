use std::fmt::Write;

use super::{NodeClass, NodeSetDocument, WireDefinition, WireNode, WireValue};
use crate::error::Result;

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Serialize a document as UANodeSet XML.
///
/// Output is deterministic: sections, nodes and references are written in
/// the order the document holds them, attributes in a fixed order.
pub fn write_nodeset(doc: &NodeSetDocument) -> Result<String> {
    let mut xml = String::new();

    // ── Header ──
    writeln!(xml, r#"<?xml version="1.0" encoding="utf-8"?>"#)?;
    write!(
        xml,
        r#"<UANodeSet xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:uax="http://opcfoundation.org/UA/2008/02/Types.xsd" xmlns="http://opcfoundation.org/UA/2011/03/UANodeSet.xsd""#
    )?;
    if let Some(ts) = doc.last_modified {
        write!(xml, r#" LastModified="{}""#, ts.format(DATE_FORMAT))?;
    }
    writeln!(xml, ">")?;

    if !doc.namespace_uris.is_empty() {
        writeln!(xml, "  <NamespaceUris>")?;
        for uri in &doc.namespace_uris {
            writeln!(xml, "    <Uri>{}</Uri>", xml_escape(uri))?;
        }
        writeln!(xml, "  </NamespaceUris>")?;
    }

    if !doc.models.is_empty() {
        writeln!(xml, "  <Models>")?;
        for model in &doc.models {
            write!(xml, r#"    <Model ModelUri="{}""#, xml_escape(&model.model_uri))?;
            if let Some(v) = &model.version {
                write!(xml, r#" Version="{}""#, xml_escape(v))?;
            }
            if let Some(d) = model.publication_date {
                write!(xml, r#" PublicationDate="{}""#, d.format(DATE_FORMAT))?;
            }
            if model.required.is_empty() {
                writeln!(xml, " />")?;
                continue;
            }
            writeln!(xml, ">")?;
            for req in &model.required {
                write!(
                    xml,
                    r#"      <RequiredModel ModelUri="{}""#,
                    xml_escape(&req.model_uri)
                )?;
                if let Some(v) = &req.version {
                    write!(xml, r#" Version="{}""#, xml_escape(v))?;
                }
                if let Some(d) = req.publication_date {
                    write!(xml, r#" PublicationDate="{}""#, d.format(DATE_FORMAT))?;
                }
                writeln!(xml, " />")?;
            }
            writeln!(xml, "    </Model>")?;
        }
        writeln!(xml, "  </Models>")?;
    }

    if !doc.aliases.is_empty() {
        writeln!(xml, "  <Aliases>")?;
        for (alias, target) in &doc.aliases {
            writeln!(
                xml,
                r#"    <Alias Alias="{}">{}</Alias>"#,
                xml_escape(alias),
                xml_escape(target)
            )?;
        }
        writeln!(xml, "  </Aliases>")?;
    }

    // ── Nodes ──
    for node in &doc.nodes {
        write_node(&mut xml, node)?;
    }

    writeln!(xml, "</UANodeSet>")?;
    Ok(xml)
}

fn write_node(xml: &mut String, node: &WireNode) -> Result<()> {
    let element = node.class.element_name();
    write!(
        xml,
        r#"  <{} NodeId="{}" BrowseName="{}""#,
        element,
        xml_escape(&node.node_id),
        xml_escape(&node.browse_name)
    )?;
    if let Some(p) = &node.parent_node_id {
        write!(xml, r#" ParentNodeId="{}""#, xml_escape(p))?;
    }
    if let Some(s) = &node.symbolic_name {
        write!(xml, r#" SymbolicName="{}""#, xml_escape(s))?;
    }
    if let Some(dt) = &node.data_type {
        write!(xml, r#" DataType="{}""#, xml_escape(dt))?;
    }
    if let Some(rank) = node.value_rank {
        write!(xml, r#" ValueRank="{}""#, rank)?;
    }
    if let Some(dims) = &node.array_dimensions {
        write!(xml, r#" ArrayDimensions="{}""#, xml_escape(dims))?;
    }
    if let Some(a) = node.access_level {
        write!(xml, r#" AccessLevel="{}""#, a)?;
    }
    if let Some(a) = node.user_access_level {
        write!(xml, r#" UserAccessLevel="{}""#, a)?;
    }
    if node.historizing {
        write!(xml, r#" Historizing="true""#)?;
    }
    if let Some(n) = node.event_notifier {
        write!(xml, r#" EventNotifier="{}""#, n)?;
    }
    if let Some(m) = &node.method_declaration_id {
        write!(xml, r#" MethodDeclarationId="{}""#, xml_escape(m))?;
    }
    if node.is_abstract {
        write!(xml, r#" IsAbstract="true""#)?;
    }
    if node.class == NodeClass::ReferenceType && node.symmetric {
        write!(xml, r#" Symmetric="true""#)?;
    }
    writeln!(xml, ">")?;

    if let Some(d) = &node.display_name {
        writeln!(xml, "    <DisplayName>{}</DisplayName>", xml_escape(d))?;
    }
    if let Some(d) = &node.description {
        writeln!(xml, "    <Description>{}</Description>", xml_escape(d))?;
    }
    for c in &node.categories {
        writeln!(xml, "    <Category>{}</Category>", xml_escape(c))?;
    }
    if let Some(d) = &node.documentation {
        writeln!(xml, "    <Documentation>{}</Documentation>", xml_escape(d))?;
    }
    if let Some(inv) = &node.inverse_name {
        writeln!(xml, "    <InverseName>{}</InverseName>", xml_escape(inv))?;
    }

    if !node.references.is_empty() {
        writeln!(xml, "    <References>")?;
        for r in &node.references {
            if r.is_forward {
                writeln!(
                    xml,
                    r#"      <Reference ReferenceType="{}">{}</Reference>"#,
                    xml_escape(&r.reference_type),
                    xml_escape(&r.target)
                )?;
            } else {
                writeln!(
                    xml,
                    r#"      <Reference ReferenceType="{}" IsForward="false">{}</Reference>"#,
                    xml_escape(&r.reference_type),
                    xml_escape(&r.target)
                )?;
            }
        }
        writeln!(xml, "    </References>")?;
    }

    if let Some(def) = &node.definition {
        write_definition(xml, def)?;
    }

    match &node.value {
        Some(WireValue::Null) => writeln!(xml, r#"    <Value xsi:nil="true" />"#)?,
        // Inner XML is written back verbatim.
        Some(WireValue::Xml(inner)) => writeln!(xml, "    <Value>{}</Value>", inner)?,
        None => {}
    }

    writeln!(xml, "  </{}>", element)?;
    Ok(())
}

fn write_definition(xml: &mut String, def: &WireDefinition) -> Result<()> {
    writeln!(xml, r#"    <Definition Name="{}">"#, xml_escape(&def.name))?;
    for f in &def.fields {
        write!(xml, r#"      <Field Name="{}""#, xml_escape(&f.name))?;
        if let Some(dt) = &f.data_type {
            write!(xml, r#" DataType="{}""#, xml_escape(dt))?;
        }
        if let Some(rank) = f.value_rank {
            write!(xml, r#" ValueRank="{}""#, rank)?;
        }
        if let Some(dims) = &f.array_dimensions {
            write!(xml, r#" ArrayDimensions="{}""#, xml_escape(dims))?;
        }
        if f.is_optional {
            write!(xml, r#" IsOptional="true""#)?;
        }
        if let Some(v) = f.value {
            write!(xml, r#" Value="{}""#, v)?;
        }
        if f.display_name.is_none() && f.description.is_none() {
            writeln!(xml, " />")?;
            continue;
        }
        writeln!(xml, ">")?;
        if let Some(d) = &f.display_name {
            writeln!(xml, "        <DisplayName>{}</DisplayName>", xml_escape(d))?;
        }
        if let Some(d) = &f.description {
            writeln!(xml, "        <Description>{}</Description>", xml_escape(d))?;
        }
        writeln!(xml, "      </Field>")?;
    }
    writeln!(xml, "    </Definition>")?;
    Ok(())
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{parse_nodeset, ModelEntry, WireField, WireReference};
    use pretty_assertions::assert_eq;

    fn sample() -> NodeSetDocument {
        let mut ty = WireNode::new(NodeClass::DataType, "ns=1;i=3001", "1:Mode");
        ty.display_name = Some("Mode <A&B>".into());
        ty.references.push(WireReference {
            reference_type: "HasSubtype".into(),
            is_forward: false,
            target: "i=29".into(),
        });
        ty.definition = Some(WireDefinition {
            name: "1:Mode".into(),
            fields: vec![
                WireField {
                    name: "Off".into(),
                    value: Some(0),
                    ..Default::default()
                },
                WireField {
                    name: "On".into(),
                    value: Some(1),
                    description: Some("running".into()),
                    ..Default::default()
                },
            ],
        });
        let mut var = WireNode::new(NodeClass::Variable, "ns=1;i=6001", "1:Setpoint");
        var.data_type = Some("i=11".into());
        var.value = Some(WireValue::Xml("<uax:Double>2.5</uax:Double>".into()));
        NodeSetDocument {
            namespace_uris: vec!["urn:pumps".into()],
            models: vec![ModelEntry {
                model_uri: "urn:pumps".into(),
                version: Some("1.0".into()),
                publication_date: Some("2020-01-01T00:00:00Z".parse().unwrap()),
                required: vec![],
            }],
            aliases: [("HasSubtype".to_string(), "i=45".to_string())].into(),
            nodes: vec![ty, var],
            last_modified: None,
        }
    }

    #[test]
    fn written_document_reads_back_identically() {
        let doc = sample();
        let xml = write_nodeset(&doc).unwrap();
        let back = parse_nodeset(&xml).unwrap();
        assert_eq!(back.namespace_uris, doc.namespace_uris);
        assert_eq!(back.models, doc.models);
        assert_eq!(back.aliases, doc.aliases);
        assert_eq!(back.nodes, doc.nodes);
    }

    #[test]
    fn escapes_text_and_attributes() {
        let xml = write_nodeset(&sample()).unwrap();
        assert!(xml.contains("Mode &lt;A&amp;B&gt;"));
        assert!(xml.contains(r#"IsForward="false""#));
        assert!(xml.contains("<Value><uax:Double>2.5</uax:Double></Value>"));
    }
}
