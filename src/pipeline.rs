//! Pipeline orchestration
//!
//! One pass over the layer stack:
//! - Resolve candidate layers
//! - Load every layer's documents
//! - Select pipeline config, endpoints and credentials
//! - Merge domain, NLU, stories and rules
//! - Consolidate entities and synonyms
//!
//! A run is a pure function of the settings and the filesystem contents.
//! The resulting [`MergeResult`] is immutable; export only reads it.

use std::io::Write;
use std::path::{Path, PathBuf};

use layerstack_merge::{Merger, PolicyTable};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::consolidate::{consolidate_entities, consolidate_synonyms, EntityRegistry, SynonymTable};
use crate::domain::merge_domain;
use crate::error::PipelineError;
use crate::export::{export_directory, export_document, Destination, ExportError};
use crate::layer::{resolve_layers, ResolvedLayers};
use crate::loader::{load_layers, DocumentKind, LayerDocument, LayerDocuments};
use crate::nlu::NluMerger;
use crate::report::ProjectInfo;
use crate::select::{select_all, Selection};
use crate::settings::Settings;
use crate::stories::{flow_count, merge_stories};

/// Where one contributing file came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub kind: DocumentKind,
    pub layer: Option<usize>,
    pub path: PathBuf,
    pub digest: String,
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub layers: ResolvedLayers,
    pub documents: Vec<LayerDocuments>,
    pub domain: Value,
    pub nlu: Value,
    pub stories: Value,
    pub rules: Value,
    pub selection: Selection,
    pub entities: EntityRegistry,
    pub synonyms: SynonymTable,

    /// Contributing files per kind, in precedence order
    pub provenance: Vec<Provenance>,
}

impl MergeResult {
    /// The merged document of a mergeable kind.
    pub fn document(&self, kind: DocumentKind) -> Option<&Value> {
        match kind {
            DocumentKind::Domain => Some(&self.domain),
            DocumentKind::Nlu => Some(&self.nlu),
            DocumentKind::Stories => Some(&self.stories),
            DocumentKind::Rules => Some(&self.rules),
            _ => None,
        }
    }

    /// Project info summary including digests of the merged documents.
    pub fn info(&self) -> Result<ProjectInfo, serde_json::Error> {
        ProjectInfo::new(&self.layers, &self.documents, Some(&self.selection))
            .with_digests(&self.domain, &self.nlu)
    }

    /// Perform the exports the settings ask for.
    ///
    /// Dumps go to their selector's destination (`stdout` receives stdout
    /// dumps); `export_dir` receives the whole project. Returns the files
    /// written.
    pub fn export(&self, settings: &Settings, stdout: &mut dyn Write) -> Result<Vec<PathBuf>, ExportError> {
        let mut written = Vec::new();

        let dumps = [
            (DocumentKind::Domain, &self.domain, settings.dump_domain.as_deref()),
            (DocumentKind::Nlu, &self.nlu, settings.dump_nlu.as_deref()),
        ];
        for (kind, value, selector) in dumps {
            let destination = Destination::from_selector(selector);
            if destination.is_discard() {
                continue;
            }
            export_document(kind, value, &destination, stdout)?;
            info!(kind = kind.as_str(), %destination, "dumped merged document");
            if let Destination::File(path) = destination {
                written.push(path);
            }
        }

        if let Some(dir) = &settings.export_dir {
            written.extend(self.export_to(dir)?);
        }
        Ok(written)
    }

    /// Write the merged project into a directory.
    pub fn export_to(&self, dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
        let documents = [
            (DocumentKind::Domain, &self.domain),
            (DocumentKind::Nlu, &self.nlu),
            (DocumentKind::Stories, &self.stories),
            (DocumentKind::Rules, &self.rules),
        ];
        let raw = [(DocumentKind::Config, self.selection.config.raw.as_str())];
        export_directory(dir, &documents, &raw)
    }
}

/// Runs the merge for one settings value.
#[derive(Debug, Clone)]
pub struct Pipeline {
    settings: Settings,
    policies: PolicyTable,
}

impl Pipeline {
    pub fn new(settings: Settings) -> Result<Self, PipelineError> {
        let policies = settings
            .domain_policies()
            .map_err(|e| PipelineError::Settings(e.into()))?;
        Ok(Self { settings, policies })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolve the configured candidates into existing layers.
    pub fn resolve(&self) -> Result<ResolvedLayers, PipelineError> {
        let resolved = resolve_layers(&self.settings.candidates())?;
        info!(
            layers = resolved.len(),
            skipped = resolved.skipped.len(),
            "resolved layer stack"
        );
        Ok(resolved)
    }

    /// Dry run: resolve, load and select, without merging.
    pub fn inspect(&self) -> Result<ProjectInfo, PipelineError> {
        let resolved = self.resolve()?;
        let documents = load_layers(&resolved.layers)?;
        let selection = select_all(&documents, self.settings.default_config.as_deref())?;
        Ok(ProjectInfo::new(&resolved, &documents, Some(&selection)))
    }

    /// Full run.
    pub fn run(&self) -> Result<MergeResult, PipelineError> {
        let layers = self.resolve()?;
        let documents = load_layers(&layers.layers)?;
        let selection = select_all(&documents, self.settings.default_config.as_deref())?;

        let of_kind = |kind| documents.iter().filter_map(move |docs| docs.get(kind));

        let merger = Merger::new(self.policies.clone());
        let mut domain = merge_domain(&merger, of_kind(DocumentKind::Domain));
        if domain.is_null() {
            domain = Value::Object(Map::new());
        }

        let mut nlu_merger = NluMerger::new();
        for doc in of_kind(DocumentKind::Nlu) {
            for value in doc.values() {
                nlu_merger.feed(doc.layer, value);
            }
        }
        let dropped = nlu_merger.dropped_examples();
        let mut nlu = nlu_merger.finish();

        let stories = merge_stories(DocumentKind::Stories, of_kind(DocumentKind::Stories));
        let rules = merge_stories(DocumentKind::Rules, of_kind(DocumentKind::Rules));

        let entities = consolidate_entities(
            per_layer(of_kind(DocumentKind::Domain)),
            &self.policies,
            &mut domain,
        )?;
        let synonyms = consolidate_synonyms(per_layer(of_kind(DocumentKind::Nlu)), &mut nlu)?;

        let provenance = provenance(&documents, &selection);

        info!(
            intents = count(&domain, "intents"),
            entities = entities.len(),
            nlu_items = count(&nlu, "nlu"),
            dropped_examples = dropped,
            synonyms = synonyms.len(),
            stories = flow_count(&stories, DocumentKind::Stories),
            rules = flow_count(&rules, DocumentKind::Rules),
            "merged project"
        );

        Ok(MergeResult {
            layers,
            documents,
            domain,
            nlu,
            stories,
            rules,
            selection,
            entities,
            synonyms,
            provenance,
        })
    }
}

/// `(layer, document)` pairs for every part, in precedence order.
fn per_layer<'a, I>(documents: I) -> impl Iterator<Item = (usize, &'a Value)>
where
    I: Iterator<Item = &'a LayerDocument>,
{
    documents.flat_map(|doc| doc.values().map(move |value| (doc.layer, value)))
}

fn count(doc: &Value, section: &str) -> usize {
    doc.get(section)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

fn provenance(documents: &[LayerDocuments], selection: &Selection) -> Vec<Provenance> {
    let mut out = Vec::new();

    for kind in DocumentKind::ALL.iter().copied().filter(DocumentKind::is_mergeable) {
        for doc in documents.iter().filter_map(|docs| docs.get(kind)) {
            out.extend(doc.parts.iter().map(|part| Provenance {
                kind,
                layer: Some(doc.layer),
                path: part.path.clone(),
                digest: part.digest.clone(),
            }));
        }
    }

    for kind in [DocumentKind::Config, DocumentKind::Endpoints, DocumentKind::Credentials] {
        if let Some(file) = selection.get(kind) {
            out.push(Provenance {
                kind,
                layer: file.layer,
                path: file.path.clone(),
                digest: file.digest.clone(),
            });
        }
    }

    debug!(files = out.len(), "recorded provenance");
    out
}
