//! Pipeline definition: the ordered source and postprocess steps of a build

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::checkpoint::is_valid_source_name;

/// Errors raised while loading a pipeline definition
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Failed to read project file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse project file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Failed to parse project XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Project XML root element is <{found}>, expected <project>")]
    UnexpectedRoot { found: String },

    #[error("<{element}> is missing the '{attribute}' attribute")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("Invalid source name '{name}': only ASCII letters, digits and '-' are allowed")]
    InvalidSourceName { name: String },

    #[error("Step name must not be empty ({kind} #{position})")]
    EmptyName { kind: StepKind, position: usize },

    #[error("Duplicate {kind} step '{name}'")]
    DuplicateStep { kind: StepKind, name: String },
}

/// Which of the two pipeline sequences a step belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Source,
    Postprocess,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Source => write!(f, "source"),
            StepKind::Postprocess => write!(f, "postprocess"),
        }
    }
}

/// One unit of work in the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStep {
    pub name: String,
    pub kind: StepKind,
    /// Checkpoint the working database after this step succeeds (sources only)
    pub checkpoint: bool,
    /// Source type from the project file, informational only
    pub source_type: Option<String>,
}

impl PipelineStep {
    pub fn source(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StepKind::Source,
            checkpoint: false,
            source_type: None,
        }
    }

    pub fn postprocess(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StepKind::Postprocess,
            checkpoint: false,
            source_type: None,
        }
    }

    /// Flag this step for checkpointing. Ignored for postprocess steps.
    pub fn checkpointed(mut self) -> Self {
        self.checkpoint = self.kind == StepKind::Source;
        self
    }

    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }
}

/// Ordered pipeline of source steps followed by postprocess steps
///
/// Order is significant: it is both the execution order and the basis of
/// resume positions. A name-to-index lookup is built once per sequence.
#[derive(Debug, Clone, Default)]
pub struct PipelineDefinition {
    sources: Vec<PipelineStep>,
    postprocesses: Vec<PipelineStep>,
    source_index: HashMap<String, usize>,
    postprocess_index: HashMap<String, usize>,
}

impl PipelineDefinition {
    /// Build a definition, validating names and uniqueness within each sequence
    pub fn new(sources: Vec<PipelineStep>, postprocesses: Vec<PipelineStep>) -> Result<Self, ProjectError> {
        debug!(
            sources = sources.len(),
            postprocesses = postprocesses.len(),
            "PipelineDefinition::new: called"
        );

        let sources: Vec<PipelineStep> = sources
            .into_iter()
            .map(|mut step| {
                step.kind = StepKind::Source;
                step
            })
            .collect();

        let postprocesses: Vec<PipelineStep> = postprocesses
            .into_iter()
            .map(|mut step| {
                if step.checkpoint {
                    warn!(step = %step.name, "Postprocess steps cannot be checkpointed, ignoring flag");
                }
                step.kind = StepKind::Postprocess;
                step.checkpoint = false;
                step
            })
            .collect();

        for step in &sources {
            if !step.name.is_empty() && !is_valid_source_name(&step.name) {
                return Err(ProjectError::InvalidSourceName {
                    name: step.name.clone(),
                });
            }
        }

        let source_index = build_index(StepKind::Source, &sources)?;
        let postprocess_index = build_index(StepKind::Postprocess, &postprocesses)?;

        Ok(Self {
            sources,
            postprocesses,
            source_index,
            postprocess_index,
        })
    }

    /// Load a definition from a project file
    ///
    /// Files ending in `.xml` are read as an InterMine `project.xml`, anything
    /// else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        debug!(?path, "PipelineDefinition::load: called");
        let content = fs::read_to_string(path).map_err(|source| ProjectError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_xml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        let definition = if is_xml {
            Self::from_xml(&content)?
        } else {
            Self::from_yaml(&content)?
        };
        info!(
            "Loaded project {} ({} sources, {} postprocesses)",
            path.display(),
            definition.sources.len(),
            definition.postprocesses.len()
        );
        Ok(definition)
    }

    /// Parse a definition from YAML text
    pub fn from_yaml(content: &str) -> Result<Self, ProjectError> {
        let file: ProjectFile = serde_yaml::from_str(content)?;
        let sources = file.sources.into_iter().map(|e| e.into_step(StepKind::Source)).collect();
        let postprocesses = file
            .post_processing
            .into_iter()
            .map(|e| e.into_step(StepKind::Postprocess))
            .collect();
        Self::new(sources, postprocesses)
    }

    /// Parse a definition from an InterMine `project.xml`
    ///
    /// Steps come from `/project/sources/source` and
    /// `/project/post-processing/post-process` in document order. Nested
    /// `<property>` elements configure the sources themselves and are skipped.
    pub fn from_xml(content: &str) -> Result<Self, ProjectError> {
        let doc = roxmltree::Document::parse(content)?;
        let root = doc.root_element();
        if !root.has_tag_name("project") {
            return Err(ProjectError::UnexpectedRoot {
                found: root.tag_name().name().to_string(),
            });
        }
        let sources = xml_steps(root, "sources", StepKind::Source)?;
        let postprocesses = xml_steps(root, "post-processing", StepKind::Postprocess)?;
        Self::new(sources, postprocesses)
    }

    pub fn sources(&self) -> &[PipelineStep] {
        &self.sources
    }

    pub fn postprocesses(&self) -> &[PipelineStep] {
        &self.postprocesses
    }

    /// Position of a source step, if it is part of this pipeline
    pub fn source_index(&self, name: &str) -> Option<usize> {
        self.source_index.get(name).copied()
    }

    pub fn postprocess_index(&self, name: &str) -> Option<usize> {
        self.postprocess_index.get(name).copied()
    }

    pub fn source(&self, name: &str) -> Option<&PipelineStep> {
        self.source_index(name).map(|i| &self.sources[i])
    }
}

fn build_index(kind: StepKind, steps: &[PipelineStep]) -> Result<HashMap<String, usize>, ProjectError> {
    let mut index = HashMap::with_capacity(steps.len());
    for (position, step) in steps.iter().enumerate() {
        if step.name.is_empty() {
            return Err(ProjectError::EmptyName { kind, position });
        }
        if index.insert(step.name.clone(), position).is_some() {
            return Err(ProjectError::DuplicateStep {
                kind,
                name: step.name.clone(),
            });
        }
    }
    Ok(index)
}

fn xml_steps(
    root: roxmltree::Node<'_, '_>,
    group: &str,
    kind: StepKind,
) -> Result<Vec<PipelineStep>, ProjectError> {
    let element = match kind {
        StepKind::Source => "source",
        StepKind::Postprocess => "post-process",
    };
    let mut steps = Vec::new();

    for entry in root
        .children()
        .filter(|n| n.has_tag_name(group))
        .flat_map(|n| n.children())
        .filter(|n| n.has_tag_name(element))
    {
        let required = |attribute: &'static str| {
            entry
                .attribute(attribute)
                .ok_or(ProjectError::MissingAttribute { element, attribute })
        };
        let mut step = match kind {
            StepKind::Source => PipelineStep::source(required("name")?).with_source_type(required("type")?),
            StepKind::Postprocess => PipelineStep::postprocess(required("name")?),
        };
        step.checkpoint = entry.attribute("dump").is_some_and(|v| v.eq_ignore_ascii_case("true"));
        steps.push(step);
    }
    Ok(steps)
}

/// On-disk layout of a YAML project file
#[derive(Debug, Deserialize)]
struct ProjectFile {
    #[serde(default)]
    sources: Vec<StepEntry>,

    #[serde(default, rename = "post-processing", alias = "postprocesses")]
    post_processing: Vec<StepEntry>,
}

#[derive(Debug, Deserialize)]
struct StepEntry {
    name: String,

    #[serde(default, rename = "type")]
    source_type: Option<String>,

    #[serde(default, alias = "dump")]
    checkpoint: bool,
}

impl StepEntry {
    fn into_step(self, kind: StepKind) -> PipelineStep {
        PipelineStep {
            name: self.name,
            kind,
            checkpoint: self.checkpoint,
            source_type: self.source_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROJECT: &str = r#"
sources:
  - name: so
    type: so
  - name: go-annotation
    type: go-annotation
    checkpoint: true
  - name: homologene
    type: homologene
post-processing:
  - name: create-references
  - name: do-sources
    dump: true
"#;

    #[test]
    fn test_from_yaml_preserves_order() {
        let def = PipelineDefinition::from_yaml(PROJECT).unwrap();

        let names: Vec<&str> = def.sources().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["so", "go-annotation", "homologene"]);
        assert_eq!(def.source_index("homologene"), Some(2));
        assert_eq!(def.postprocess_index("do-sources"), Some(1));
        assert!(def.source("go-annotation").unwrap().checkpoint);
        assert!(!def.source("so").unwrap().checkpoint);
        assert_eq!(def.source("so").unwrap().source_type.as_deref(), Some("so"));
    }

    #[test]
    fn test_postprocess_checkpoint_flag_is_dropped() {
        let def = PipelineDefinition::from_yaml(PROJECT).unwrap();
        assert!(def.postprocesses().iter().all(|p| !p.checkpoint));
        assert!(def.postprocesses().iter().all(|p| p.kind == StepKind::Postprocess));
    }

    #[test]
    fn test_dump_alias_marks_checkpoint() {
        let def = PipelineDefinition::from_yaml("sources:\n  - name: uniprot\n    dump: true\n").unwrap();
        assert!(def.sources()[0].checkpoint);
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let err = PipelineDefinition::new(vec![PipelineStep::source("a"), PipelineStep::source("a")], vec![]).unwrap_err();
        assert!(matches!(err, ProjectError::DuplicateStep { kind: StepKind::Source, ref name } if name == "a"));
    }

    #[test]
    fn test_same_name_allowed_across_sequences() {
        let def = PipelineDefinition::new(vec![PipelineStep::source("a")], vec![PipelineStep::postprocess("a")]);
        assert!(def.is_ok());
    }

    #[test]
    fn test_invalid_source_names_rejected() {
        for bad in ["go_annotation", "go.annotation", "db:name", "with space"] {
            let err = PipelineDefinition::new(vec![PipelineStep::source(bad)], vec![]).unwrap_err();
            assert!(matches!(err, ProjectError::InvalidSourceName { .. }), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = PipelineDefinition::new(vec![PipelineStep::source("")], vec![]).unwrap_err();
        assert!(matches!(err, ProjectError::EmptyName { position: 0, .. }));
    }

    #[test]
    fn test_checkpointed_ignored_for_postprocess() {
        assert!(!PipelineStep::postprocess("p").checkpointed().checkpoint);
        assert!(PipelineStep::source("s").checkpointed().checkpoint);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = PipelineDefinition::load(temp.path().join("nope.yml")).unwrap_err();
        assert!(matches!(err, ProjectError::Read { .. }));
    }

    const PROJECT_XML: &str = r#"<project type="bio">
  <property name="target.model" value="genomic"/>
  <property name="source.location" location="../bio/sources/"/>
  <sources>
    <source name="uniprot-malaria" type="uniprot">
      <property name="uniprot.organisms" value="36329"/>
      <property name="src.data.dir" location="/data/uniprot"/>
    </source>
    <source name="malaria-gff" type="malaria-gff" dump="true">
      <property name="gff3.taxonId" value="36329"/>
    </source>
    <source name="go" type="go"/>
    <source name="go-annotation" type="go-annotation" dump="TRUE"/>
    <source name="update-publications" type="update-publications" dump="false"/>
  </sources>
  <post-processing>
    <post-process name="create-references"/>
    <post-process name="transfer-sequences" dump="true"/>
    <post-process name="do-sources"/>
    <post-process name="summarise-objectstore"/>
  </post-processing>
</project>
"#;

    #[test]
    fn test_from_xml_reads_sources_and_postprocesses() {
        let def = PipelineDefinition::from_xml(PROJECT_XML).unwrap();

        let names: Vec<&str> = def.sources().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["uniprot-malaria", "malaria-gff", "go", "go-annotation", "update-publications"]
        );
        let dumped: Vec<&str> = def
            .sources()
            .iter()
            .filter(|s| s.checkpoint)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(dumped, vec!["malaria-gff", "go-annotation"]);
        assert_eq!(def.source("uniprot-malaria").unwrap().source_type.as_deref(), Some("uniprot"));

        assert_eq!(def.postprocesses().len(), 4);
        assert_eq!(def.postprocess_index("do-sources"), Some(2));
        assert!(def.postprocesses().iter().all(|p| !p.checkpoint));
    }

    #[test]
    fn test_from_xml_without_post_processing() {
        let def = PipelineDefinition::from_xml(
            r#"<project><sources><source name="so" type="so"/></sources></project>"#,
        )
        .unwrap();
        assert_eq!(def.sources().len(), 1);
        assert!(def.postprocesses().is_empty());
    }

    #[test]
    fn test_from_xml_requires_source_type() {
        let err = PipelineDefinition::from_xml(r#"<project><sources><source name="so"/></sources></project>"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ProjectError::MissingAttribute {
                element: "source",
                attribute: "type"
            }
        ));
    }

    #[test]
    fn test_from_xml_rejects_other_documents() {
        let err = PipelineDefinition::from_xml("<classes/>").unwrap_err();
        assert!(matches!(err, ProjectError::UnexpectedRoot { ref found } if found == "classes"));

        let err = PipelineDefinition::from_xml("<project><sources>").unwrap_err();
        assert!(matches!(err, ProjectError::Xml(_)));
    }

    #[test]
    fn test_from_xml_validates_names() {
        let err = PipelineDefinition::from_xml(
            r#"<project><sources><source name="uni_prot" type="uniprot"/></sources></project>"#,
        )
        .unwrap_err();
        assert!(matches!(err, ProjectError::InvalidSourceName { ref name } if name == "uni_prot"));
    }

    #[test]
    fn test_load_dispatches_on_extension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("project.xml");
        fs::write(&path, PROJECT_XML).unwrap();

        let def = PipelineDefinition::load(&path).unwrap();
        assert_eq!(def.sources().len(), 5);
        assert!(def.source("malaria-gff").unwrap().checkpoint);
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("project.yml");
        fs::write(&path, PROJECT).unwrap();

        let def = PipelineDefinition::load(&path).unwrap();
        assert_eq!(def.sources().len(), 3);
        assert_eq!(def.postprocesses().len(), 2);
    }
}
