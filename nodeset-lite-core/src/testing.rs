//! Shared fixtures for unit tests.

use crate::context::{BuildContext, NoAnnotation};
use crate::error::Diagnostics;
use crate::import::wire_to_graph::WireGraphBuilder;
use crate::model::NodeGraph;
use crate::registry::IdentityRegistry;
use crate::wire::parse_nodeset;

pub(crate) const BASE: &str = r#"<UANodeSet>
  <Models><Model ModelUri="http://opcfoundation.org/UA/" Version="1.04" PublicationDate="2019-05-01T00:00:00Z" /></Models>
  <UAObjectType NodeId="i=58" BrowseName="BaseObjectType" IsAbstract="true" />
  <UAObjectType NodeId="i=17602" BrowseName="BaseInterfaceType" IsAbstract="true">
<References><Reference ReferenceType="i=45" IsForward="false">i=58</Reference></References>
  </UAObjectType>
  <UAVariableType NodeId="i=62" BrowseName="BaseVariableType" IsAbstract="true" />
  <UAVariableType NodeId="i=63" BrowseName="BaseDataVariableType">
<References><Reference ReferenceType="i=45" IsForward="false">i=62</Reference></References>
  </UAVariableType>
  <UAVariableType NodeId="i=68" BrowseName="PropertyType">
<References><Reference ReferenceType="i=45" IsForward="false">i=62</Reference></References>
  </UAVariableType>
  <UADataType NodeId="i=24" BrowseName="BaseDataType" IsAbstract="true" />
  <UADataType NodeId="i=11" BrowseName="Double">
<References><Reference ReferenceType="i=45" IsForward="false">i=24</Reference></References>
  </UADataType>
  <UADataType NodeId="i=22" BrowseName="Structure" IsAbstract="true">
<References><Reference ReferenceType="i=45" IsForward="false">i=24</Reference></References>
  </UADataType>
  <UAReferenceType NodeId="i=35" BrowseName="Organizes" />
</UANodeSet>"#;

pub(crate) const PUMPS: &str = r#"<UANodeSet>
  <NamespaceUris><Uri>urn:pumps</Uri></NamespaceUris>
  <Models><Model ModelUri="urn:pumps" Version="1.0" PublicationDate="2020-01-01T00:00:00Z" /></Models>
  <Aliases>
<Alias Alias="HasComponent">i=47</Alias>
<Alias Alias="HasProperty">i=46</Alias>
<Alias Alias="HasSubtype">i=45</Alias>
<Alias Alias="HasTypeDefinition">i=40</Alias>
<Alias Alias="HasModellingRule">i=37</Alias>
  </Aliases>
  <UAObjectType NodeId="ns=1;i=1001" BrowseName="1:PumpType">
<References>
  <Reference ReferenceType="HasSubtype" IsForward="false">i=58</Reference>
  <Reference ReferenceType="HasProperty">ns=1;i=1002</Reference>
  <Reference ReferenceType="HasComponent">ns=1;i=1003</Reference>
</References>
  </UAObjectType>
  <UAVariable NodeId="ns=1;i=1002" BrowseName="1:Serial" ParentNodeId="ns=1;i=1001" DataType="i=11">
<References>
  <Reference ReferenceType="HasTypeDefinition">i=68</Reference>
  <Reference ReferenceType="HasModellingRule">i=78</Reference>
</References>
  </UAVariable>
  <UAVariable NodeId="ns=1;i=1003" BrowseName="1:Speed" ParentNodeId="ns=1;i=1001" DataType="i=11">
<References>
  <Reference ReferenceType="HasTypeDefinition">i=63</Reference>
  <Reference ReferenceType="HasProperty">ns=1;i=1004</Reference>
</References>
  </UAVariable>
  <UAVariable NodeId="ns=1;i=1004" BrowseName="EURange" ParentNodeId="ns=1;i=1003" DataType="i=11">
<References><Reference ReferenceType="HasTypeDefinition">i=68</Reference></References>
<Value><Range><Low>0</Low></Range></Value>
  </UAVariable>
  <UAObjectType NodeId="ns=1;i=1010" BrowseName="1:BigPumpType">
<References>
  <Reference ReferenceType="HasSubtype" IsForward="false">ns=1;i=1001</Reference>
  <Reference ReferenceType="HasProperty">ns=1;i=1011</Reference>
  <Reference ReferenceType="HasProperty">ns=1;i=1012</Reference>
</References>
  </UAObjectType>
  <UAVariable NodeId="ns=1;i=1011" BrowseName="1:Serial" DataType="i=11">
<References><Reference ReferenceType="HasTypeDefinition">i=68</Reference></References>
  </UAVariable>
  <UAVariable NodeId="ns=1;i=1012" BrowseName="1:Capacity" DataType="i=11">
<References><Reference ReferenceType="HasTypeDefinition">i=68</Reference></References>
  </UAVariable>
  <UAObjectType NodeId="ns=1;i=1020" BrowseName="1:IMaintainable" IsAbstract="true">
<References><Reference ReferenceType="HasSubtype" IsForward="false">i=17602</Reference></References>
  </UAObjectType>
  <UAView NodeId="ns=1;i=5000" BrowseName="1:View" />
</UANodeSet>"#;

pub(crate) fn build(xml: &[&str]) -> (NodeGraph, Diagnostics) {
    let docs: Vec<_> = xml.iter().map(|x| parse_nodeset(x).unwrap()).collect();
    let mut registry = IdentityRegistry::new();
    let mut diagnostics = Diagnostics::new();
    let mut annotator = NoAnnotation;
    let mut ctx = BuildContext::new(&mut registry, &mut diagnostics, &mut annotator);
    WireGraphBuilder::with_documents(docs.iter())
        .build(&mut ctx)
        .unwrap();
    (registry.into_graph(), diagnostics)
}
