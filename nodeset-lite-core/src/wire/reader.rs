use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use super::{
    ModelEntry, NodeClass, NodeSetDocument, RequiredModel, WireDefinition, WireField, WireNode,
    WireReference, WireValue,
};
use crate::error::{ModelError, Result};

type XmlReader<'a> = Reader<&'a [u8]>;

/// Some producers write `<Value/>` for variables without a value, which
/// readers disagree on. Rewrite every empty value element to an explicit
/// null before parsing.
pub fn normalize_empty_values(xml: &str) -> String {
    const NIL: &str = r#"<Value xsi:nil="true" />"#;
    xml.replace("<Value></Value>", NIL)
        .replace("<Value />", NIL)
        .replace("<Value/>", NIL)
}

/// Parse a UANodeSet document.
pub fn parse_nodeset(xml: &str) -> Result<NodeSetDocument> {
    let normalized = normalize_empty_values(xml);
    let mut reader = Reader::from_str(&normalized);
    reader.config_mut().trim_text(true);

    let mut doc = NodeSetDocument::default();
    let mut seen_root = false;

    loop {
        let event = reader.read_event().map_err(|e| xml_error(&reader, e))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"UANodeSet" => {
                    seen_root = true;
                    doc.last_modified = optional_date(&e, "LastModified")?;
                }
                b"NamespaceUris" => doc.namespace_uris = read_uris(&mut reader, &e)?,
                b"Models" | b"Aliases" => {}
                b"Model" => doc.models.push(read_model(&mut reader, &e)?),
                b"Alias" => {
                    let alias = required_attr(&e, "Alias")?;
                    let target = read_text(&mut reader, &e)?;
                    doc.aliases.insert(alias, target);
                }
                name => match NodeClass::from_element_name(&String::from_utf8_lossy(name)) {
                    Some(class) => doc.nodes.push(read_node(&mut reader, &e, class, false)?),
                    None => skip(&mut reader, &e)?,
                },
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"UANodeSet" => seen_root = true,
                b"Model" => doc.models.push(model_attrs(&e)?),
                name => {
                    if let Some(class) = NodeClass::from_element_name(&String::from_utf8_lossy(name)) {
                        doc.nodes.push(read_node(&mut reader, &e, class, true)?);
                    }
                }
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(ModelError::InvalidDocument(
            "missing UANodeSet root element".to_string(),
        ));
    }

    debug!(
        models = doc.models.len(),
        nodes = doc.nodes.len(),
        "parsed nodeset"
    );
    Ok(doc)
}

// ── Sections ──

fn read_uris(reader: &mut XmlReader, start: &BytesStart) -> Result<Vec<String>> {
    let mut uris = Vec::new();
    loop {
        match reader.read_event().map_err(|e| xml_error(reader, e))? {
            Event::Start(e) if e.local_name().as_ref() == b"Uri" => {
                uris.push(read_text(reader, &e)?);
            }
            Event::End(e) if e.local_name().as_ref() == start.local_name().as_ref() => break,
            Event::Eof => return Err(eof("NamespaceUris")),
            _ => {}
        }
    }
    Ok(uris)
}

fn model_attrs(e: &BytesStart) -> Result<ModelEntry> {
    Ok(ModelEntry {
        model_uri: required_attr(e, "ModelUri")?,
        version: attr(e, "Version")?,
        publication_date: optional_date(e, "PublicationDate")?,
        required: Vec::new(),
    })
}

fn required_model(e: &BytesStart) -> Result<RequiredModel> {
    Ok(RequiredModel {
        model_uri: required_attr(e, "ModelUri")?,
        version: attr(e, "Version")?,
        publication_date: optional_date(e, "PublicationDate")?,
    })
}

fn read_model(reader: &mut XmlReader, start: &BytesStart) -> Result<ModelEntry> {
    let mut model = model_attrs(start)?;
    loop {
        match reader.read_event().map_err(|e| xml_error(reader, e))? {
            Event::Empty(e) if e.local_name().as_ref() == b"RequiredModel" => {
                model.required.push(required_model(&e)?);
            }
            Event::Start(e) if e.local_name().as_ref() == b"RequiredModel" => {
                model.required.push(required_model(&e)?);
                skip(reader, &e)?;
            }
            Event::Start(e) => skip(reader, &e)?,
            Event::End(e) if e.local_name().as_ref() == b"Model" => break,
            Event::Eof => return Err(eof("Model")),
            _ => {}
        }
    }
    Ok(model)
}

fn read_node(
    reader: &mut XmlReader,
    start: &BytesStart,
    class: NodeClass,
    empty: bool,
) -> Result<WireNode> {
    let mut node = WireNode::new(
        class,
        required_attr(start, "NodeId")?,
        required_attr(start, "BrowseName")?,
    );

    for a in start.attributes() {
        let a = a.map_err(|e| ModelError::Parse(format!("attribute: {}", e)))?;
        let value = a
            .unescape_value()
            .map_err(|e| ModelError::Parse(format!("attribute: {}", e)))?
            .into_owned();
        match a.key.local_name().as_ref() {
            b"ParentNodeId" => node.parent_node_id = Some(value),
            b"SymbolicName" => node.symbolic_name = Some(value),
            b"IsAbstract" => node.is_abstract = parse_bool(&value),
            b"Symmetric" => node.symmetric = parse_bool(&value),
            b"DataType" => node.data_type = Some(value),
            b"ValueRank" => node.value_rank = Some(parse_num(&value, "ValueRank")?),
            b"ArrayDimensions" => node.array_dimensions = Some(value),
            b"AccessLevel" => node.access_level = Some(parse_num(&value, "AccessLevel")?),
            b"UserAccessLevel" => {
                node.user_access_level = Some(parse_num(&value, "UserAccessLevel")?)
            }
            b"Historizing" => node.historizing = parse_bool(&value),
            b"EventNotifier" => node.event_notifier = Some(parse_num(&value, "EventNotifier")?),
            b"MethodDeclarationId" => node.method_declaration_id = Some(value),
            _ => {}
        }
    }

    if empty {
        return Ok(node);
    }

    loop {
        match reader.read_event().map_err(|e| xml_error(reader, e))? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"DisplayName" => node.display_name = Some(read_text(reader, &e)?),
                b"Description" => node.description = Some(read_text(reader, &e)?),
                b"Documentation" => node.documentation = Some(read_text(reader, &e)?),
                b"Category" => node.categories.push(read_text(reader, &e)?),
                b"InverseName" => node.inverse_name = Some(read_text(reader, &e)?),
                b"References" => {}
                b"Reference" => node.references.push(read_reference(reader, &e)?),
                b"Value" => node.value = Some(read_value(reader, &e)?),
                b"Definition" => node.definition = Some(read_definition(reader, &e)?),
                _ => skip(reader, &e)?,
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"Value" => node.value = Some(WireValue::Null),
                b"DisplayName" => node.display_name = Some(String::new()),
                b"Definition" => {
                    node.definition = Some(WireDefinition {
                        name: required_attr(&e, "Name")?,
                        fields: Vec::new(),
                    })
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == start.local_name().as_ref() => break,
            Event::Eof => return Err(eof(class.element_name())),
            _ => {}
        }
    }
    Ok(node)
}

fn read_reference(reader: &mut XmlReader, start: &BytesStart) -> Result<WireReference> {
    let reference_type = required_attr(start, "ReferenceType")?;
    let is_forward = attr(start, "IsForward")?
        .map(|v| parse_bool(&v))
        .unwrap_or(true);
    let target = read_text(reader, start)?;
    if target.is_empty() {
        return Err(ModelError::Parse(format!(
            "{} reference without a target",
            reference_type
        )));
    }
    Ok(WireReference {
        reference_type,
        is_forward,
        target,
    })
}

fn read_value(reader: &mut XmlReader, start: &BytesStart) -> Result<WireValue> {
    let end = start.to_end().into_owned();
    let raw = reader
        .read_text(end.name())
        .map_err(|e| xml_error(reader, e))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Ok(WireValue::Null)
    } else {
        Ok(WireValue::Xml(trimmed.to_string()))
    }
}

fn read_definition(reader: &mut XmlReader, start: &BytesStart) -> Result<WireDefinition> {
    let mut def = WireDefinition {
        name: required_attr(start, "Name")?,
        fields: Vec::new(),
    };
    loop {
        match reader.read_event().map_err(|e| xml_error(reader, e))? {
            Event::Empty(e) if e.local_name().as_ref() == b"Field" => {
                def.fields.push(field_attrs(&e)?);
            }
            Event::Start(e) if e.local_name().as_ref() == b"Field" => {
                let mut field = field_attrs(&e)?;
                read_field_body(reader, &mut field)?;
                def.fields.push(field);
            }
            Event::Start(e) => skip(reader, &e)?,
            Event::End(e) if e.local_name().as_ref() == b"Definition" => break,
            Event::Eof => return Err(eof("Definition")),
            _ => {}
        }
    }
    Ok(def)
}

fn field_attrs(e: &BytesStart) -> Result<WireField> {
    Ok(WireField {
        name: required_attr(e, "Name")?,
        data_type: attr(e, "DataType")?,
        value_rank: attr(e, "ValueRank")?
            .map(|v| parse_num(&v, "ValueRank"))
            .transpose()?,
        array_dimensions: attr(e, "ArrayDimensions")?,
        is_optional: attr(e, "IsOptional")?
            .map(|v| parse_bool(&v))
            .unwrap_or(false),
        value: attr(e, "Value")?
            .map(|v| parse_num(&v, "Value"))
            .transpose()?,
        display_name: None,
        description: None,
    })
}

fn read_field_body(reader: &mut XmlReader, field: &mut WireField) -> Result<()> {
    loop {
        match reader.read_event().map_err(|e| xml_error(reader, e))? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"Description" => field.description = Some(read_text(reader, &e)?),
                b"DisplayName" => field.display_name = Some(read_text(reader, &e)?),
                _ => skip(reader, &e)?,
            },
            Event::End(e) if e.local_name().as_ref() == b"Field" => return Ok(()),
            Event::Eof => return Err(eof("Field")),
            _ => {}
        }
    }
}

// ── Helpers ──

fn read_text(reader: &mut XmlReader, start: &BytesStart) -> Result<String> {
    let end = start.to_end().into_owned();
    let raw = reader
        .read_text(end.name())
        .map_err(|e| xml_error(reader, e))?;
    let text = quick_xml::escape::unescape(&raw)
        .map_err(|e| ModelError::Parse(format!("text: {}", e)))?;
    Ok(text.trim().to_string())
}

fn skip(reader: &mut XmlReader, start: &BytesStart) -> Result<()> {
    let end = start.to_end().into_owned();
    reader
        .read_to_end(end.name())
        .map_err(|e| xml_error(reader, e))?;
    Ok(())
}

fn attr(e: &BytesStart, name: &str) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(|err| ModelError::Parse(format!("attribute: {}", err)))?;
        if a.key.local_name().as_ref() == name.as_bytes() {
            let value = a
                .unescape_value()
                .map_err(|err| ModelError::Parse(format!("attribute {}: {}", name, err)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn required_attr(e: &BytesStart, name: &str) -> Result<String> {
    attr(e, name)?.ok_or_else(|| {
        ModelError::Parse(format!(
            "<{}> is missing the {} attribute",
            String::from_utf8_lossy(e.local_name().as_ref()),
            name
        ))
    })
}

fn optional_date(e: &BytesStart, name: &str) -> Result<Option<DateTime<Utc>>> {
    attr(e, name)?.map(|v| parse_date(&v)).transpose()
}

/// Accepts RFC 3339, a zone-less timestamp (taken as UTC) or a bare date.
pub(crate) fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Ok(d.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(d.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc());
        }
    }
    Err(ModelError::Parse(format!("bad date '{}'", s)))
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim(), "true" | "True" | "1")
}

fn parse_num<T: std::str::FromStr>(s: &str, what: &str) -> Result<T> {
    s.trim()
        .parse::<T>()
        .map_err(|_| ModelError::Parse(format!("bad {} '{}'", what, s)))
}

fn xml_error(reader: &XmlReader, err: quick_xml::Error) -> ModelError {
    ModelError::Parse(format!(
        "XML error at byte {}: {}",
        reader.buffer_position(),
        err
    ))
}

fn eof(element: &str) -> ModelError {
    ModelError::Parse(format!("unexpected end of document inside <{}>", element))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<UANodeSet xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
           xmlns="http://opcfoundation.org/UA/2011/03/UANodeSet.xsd"
           LastModified="2021-06-01T00:00:00Z">
  <NamespaceUris>
    <Uri>http://example.com/Pumps/</Uri>
  </NamespaceUris>
  <Models>
    <Model ModelUri="http://example.com/Pumps/" Version="1.1" PublicationDate="2021-06-01T00:00:00Z">
      <RequiredModel ModelUri="http://opcfoundation.org/UA/" Version="1.04" PublicationDate="2019-05-01T00:00:00Z" />
    </Model>
  </Models>
  <Aliases>
    <Alias Alias="HasComponent">i=47</Alias>
    <Alias Alias="Double">i=11</Alias>
  </Aliases>
  <UAObjectType NodeId="ns=1;i=1001" BrowseName="1:PumpType" IsAbstract="true">
    <DisplayName>Pump &amp; Motor</DisplayName>
    <Description>A pump</Description>
    <Category>Pumps</Category>
    <References>
      <Reference ReferenceType="HasSubtype" IsForward="false">i=58</Reference>
      <Reference ReferenceType="HasComponent">ns=1;i=1002</Reference>
    </References>
  </UAObjectType>
  <UAVariable NodeId="ns=1;i=1002" BrowseName="1:Speed" ParentNodeId="ns=1;i=1001" DataType="Double" ValueRank="-1" AccessLevel="3">
    <DisplayName>Speed</DisplayName>
    <References>
      <Reference ReferenceType="HasTypeDefinition">i=63</Reference>
    </References>
    <Value/>
    <Extensions><Extension><Custom a="1"/></Extension></Extensions>
  </UAVariable>
  <UADataType NodeId="ns=1;i=3001" BrowseName="1:Mode">
    <DisplayName>Mode</DisplayName>
    <Definition Name="1:Mode">
      <Field Name="Off" Value="0" />
      <Field Name="On" Value="1"><Description>running</Description></Field>
    </Definition>
  </UADataType>
  <UAVariable NodeId="ns=1;i=1003" BrowseName="1:Limits" DataType="i=884">
    <Value><ExtensionObject><Body><Range><Low>0</Low><High>10</High></Range></Body></ExtensionObject></Value>
  </UAVariable>
  <UAView NodeId="ns=1;i=5000" BrowseName="1:View" />
</UANodeSet>"#;

    #[test]
    fn parses_header_sections() {
        let doc = parse_nodeset(DOC).unwrap();
        assert_eq!(doc.namespace_uris, vec!["http://example.com/Pumps/"]);
        let model = doc.primary_model().unwrap();
        assert_eq!(model.version.as_deref(), Some("1.1"));
        assert_eq!(model.required.len(), 1);
        assert_eq!(model.required[0].model_uri, "http://opcfoundation.org/UA/");
        assert_eq!(doc.aliases.get("HasComponent").map(String::as_str), Some("i=47"));
        assert!(doc.last_modified.is_some());
    }

    #[test]
    fn parses_node_attributes_and_references() {
        let doc = parse_nodeset(DOC).unwrap();
        let ty = &doc.nodes[0];
        assert_eq!(ty.class, NodeClass::ObjectType);
        assert!(ty.is_abstract);
        assert_eq!(ty.display_name.as_deref(), Some("Pump & Motor"));
        assert_eq!(ty.categories, vec!["Pumps"]);
        assert_eq!(ty.references.len(), 2);
        assert!(!ty.references[0].is_forward);
        assert_eq!(ty.references[1].target, "ns=1;i=1002");
    }

    #[test]
    fn empty_value_becomes_null_and_extensions_are_skipped() {
        let doc = parse_nodeset(DOC).unwrap();
        let var = &doc.nodes[1];
        assert_eq!(var.value, Some(WireValue::Null));
        assert_eq!(var.value_rank, Some(-1));
        assert_eq!(var.access_level, Some(3));
        assert_eq!(var.parent_node_id.as_deref(), Some("ns=1;i=1001"));
    }

    #[test]
    fn value_keeps_inner_xml() {
        let doc = parse_nodeset(DOC).unwrap();
        match &doc.nodes[3].value {
            Some(WireValue::Xml(xml)) => assert!(xml.starts_with("<ExtensionObject>")),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn parses_enumeration_definition() {
        let doc = parse_nodeset(DOC).unwrap();
        let def = doc.nodes[2].definition.as_ref().unwrap();
        assert!(def.is_enumeration());
        assert_eq!(def.fields[1].description.as_deref(), Some("running"));
        assert_eq!(doc.nodes.last().unwrap().class, NodeClass::View);
    }

    #[test]
    fn normalizes_all_empty_value_spellings() {
        let n = normalize_empty_values("<Value/><Value /><Value></Value>");
        assert_eq!(n.matches("xsi:nil").count(), 3);
    }

    #[test]
    fn rejects_documents_without_root() {
        let err = parse_nodeset("<Other/>").unwrap_err();
        assert!(matches!(err, ModelError::InvalidDocument(_)));
    }

    #[test]
    fn parses_bare_dates() {
        assert_eq!(
            parse_date("2021-01-01").unwrap(),
            parse_date("2021-01-01T00:00:00Z").unwrap()
        );
        assert!(parse_date("yesterday").is_err());
    }
}
