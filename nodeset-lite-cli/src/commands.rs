use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use nodeset_lite_core::batch::{build_graph, ExportBatch, ImportBatch};
use nodeset_lite_core::config::BatchConfig;
use nodeset_lite_core::export::graph_to_records::RecordProjector;
use nodeset_lite_core::export::graph_to_wire::WireProjector;
use nodeset_lite_core::model::compare::diff_graphs;
use nodeset_lite_core::records::store::{MemoryRecordStore, RecordStore};
use nodeset_lite_core::resolver::{
    DependencyResolver, NamespaceCache, NamespaceFetcher, NamespaceRecord, NoFetcher,
};
use nodeset_lite_core::wire::validate::validate_document;
use nodeset_lite_core::wire::{parse_nodeset, write_nodeset, NodeSetDocument};
use nodeset_lite_core::Diagnostics;

use crate::library::DirectoryFetcher;
use crate::Target;

fn read_documents(files: &[PathBuf]) -> Result<Vec<NodeSetDocument>> {
    if files.is_empty() {
        bail!("no nodeset files given");
    }
    let mut docs = Vec::with_capacity(files.len());
    for path in files {
        let xml = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let doc = parse_nodeset(&xml).with_context(|| format!("parsing {}", path.display()))?;
        let errors = validate_document(&doc);
        if !errors.is_empty() {
            let listed: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            bail!("{} is invalid:\n  {}", path.display(), listed.join("\n  "));
        }
        docs.push(doc);
    }
    Ok(docs)
}

fn fetcher(config: &BatchConfig) -> Box<dyn NamespaceFetcher> {
    match &config.library_dir {
        Some(dir) => Box::new(DirectoryFetcher::new(dir.clone())),
        None => Box::new(NoFetcher),
    }
}

/// Namespace named by `--namespace`, else the configured supplied document.
fn primary_namespace(
    config: &BatchConfig,
    docs: &[NodeSetDocument],
    namespace: Option<String>,
) -> Result<String> {
    if let Some(ns) = namespace {
        return Ok(ns);
    }
    docs.get(config.primary_namespace_index)
        .and_then(|d| d.primary_model())
        .map(|m| m.model_uri.clone())
        .ok_or_else(|| {
            anyhow!(
                "no model at primary_namespace_index {}",
                config.primary_namespace_index
            )
        })
}

async fn resolve(
    config: &BatchConfig,
    docs: Vec<NodeSetDocument>,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Arc<NamespaceRecord>>> {
    let cache = NamespaceCache::new();
    let fetcher = fetcher(config);
    let resolution = DependencyResolver::new(&cache, fetcher.as_ref())
        .exact_match_only(config.exact_match_only)
        .timeout(config.fetch_timeout())
        .resolve(docs, diagnostics)
        .await?;
    Ok(resolution.into_ready()?)
}

fn report(diagnostics: &Diagnostics) {
    for w in diagnostics.warnings() {
        eprintln!("warning: {}", w);
    }
}

pub async fn inspect(config: &BatchConfig, files: &[PathBuf], json: bool) -> Result<()> {
    let docs = read_documents(files)?;
    let mut diagnostics = Diagnostics::new();
    let records = resolve(config, docs, &mut diagnostics).await?;
    let (graph, ids) = build_graph(&records, &mut diagnostics)?;

    let mut summary = Vec::new();
    for id in ids {
        let Some(ns) = graph.namespace(id) else {
            continue;
        };
        let mut kinds: BTreeMap<&'static str, usize> = BTreeMap::new();
        for node in ns.nodes() {
            *kinds.entry(node.kind().as_str()).or_default() += 1;
        }
        summary.push(serde_json::json!({
            "namespace": ns.uri,
            "version": ns.version,
            "publication_date": ns.publication_date,
            "required": ns.required.iter().map(|r| r.uri.clone()).collect::<Vec<_>>(),
            "nodes": ns.len(),
            "kinds": kinds,
        }));
    }

    if json {
        let out = serde_json::json!({
            "namespaces": summary,
            "warnings": diagnostics.warnings(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for ns in &summary {
        println!(
            "{} {} ({} nodes)",
            ns["namespace"].as_str().unwrap_or_default(),
            ns["version"].as_str().unwrap_or("-"),
            ns["nodes"]
        );
        if let Some(kinds) = ns["kinds"].as_object() {
            for (kind, count) in kinds {
                println!("  {:<14} {}", kind, count);
            }
        }
    }
    report(&diagnostics);
    Ok(())
}

pub async fn convert(
    config: &BatchConfig,
    files: &[PathBuf],
    to: Target,
    namespace: Option<String>,
    out: Option<PathBuf>,
) -> Result<()> {
    let docs = read_documents(files)?;
    let primary = primary_namespace(config, &docs, namespace)?;

    let store = MemoryRecordStore::new();
    let cache = NamespaceCache::new();
    let fetcher = fetcher(config);
    let outcome = ImportBatch::new(&store, &cache, fetcher.as_ref())
        .with_config(config.clone())
        .run(docs)
        .await?;
    info!(
        namespaces = outcome.namespaces.len(),
        created = outcome.created(),
        "imported into records"
    );
    for w in &outcome.warnings {
        eprintln!("warning: {}", w);
    }

    let export = ExportBatch::new(&store).with_config(config.clone());
    let (text, diagnostics) = match to {
        Target::Nodeset => export.to_nodeset(&primary).await?,
        Target::Schema => {
            let (doc, diagnostics) = export.to_schema(&primary, None).await?;
            (doc.to_json()?, diagnostics)
        }
    };
    report(&diagnostics);
    write_output(out.as_deref(), &text)
}

fn write_output(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), bytes = text.len(), "written");
        }
        None => println!("{}", text),
    }
    Ok(())
}

/// Returns true when both round trips rebuild the namespace unchanged.
pub async fn roundtrip(
    config: &BatchConfig,
    files: &[PathBuf],
    namespace: Option<String>,
) -> Result<bool> {
    let docs = read_documents(files)?;
    let primary = primary_namespace(config, &docs, namespace)?;
    let mut diagnostics = Diagnostics::new();
    let records = resolve(config, docs, &mut diagnostics).await?;
    let (graph, ids) = build_graph(&records, &mut diagnostics)?;
    let id = graph
        .namespace_id(&primary)
        .with_context(|| format!("{} was not built", primary))?;

    // XML
    let xml = write_nodeset(&WireProjector::new(&graph).project(id)?)?;
    let reparsed = NamespaceRecord::from_document(parse_nodeset(&xml)?)?;
    let replaced: Vec<Arc<NamespaceRecord>> = records
        .iter()
        .map(|r| {
            if r.uri == primary {
                Arc::new(reparsed.clone())
            } else {
                Arc::clone(r)
            }
        })
        .collect();
    let mut scratch = Diagnostics::new();
    let (from_xml, _) = build_graph(&replaced, &mut scratch)?;
    let xml_diff = diff_graphs(&graph, &from_xml, &[primary.as_str()]);

    // Records
    let store = MemoryRecordStore::new();
    store.begin().await?;
    for ns in &ids {
        RecordProjector::new(&graph, &store).project(*ns).await?;
    }
    store.commit().await?;
    let (from_records, _) = ExportBatch::new(&store)
        .load(&primary, &mut scratch)
        .await?;
    let record_diff = diff_graphs(&graph, &from_records, &[primary.as_str()]);

    report(&diagnostics);
    for (label, diff) in [("xml", &xml_diff), ("records", &record_diff)] {
        if diff.is_empty() {
            println!("{}: {} unchanged", label, primary);
        } else {
            warn!(round_trip = label, differences = diff.len(), "round trip changed the graph");
            println!("{}: {} differences\n{}", label, diff.len(), diff);
        }
    }
    Ok(xml_diff.is_empty() && record_diff.is_empty())
}
