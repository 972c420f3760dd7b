//! Filesystem-backed skills.
//!
//! A skill is a directory holding a `SKILL.md` file, optionally with YAML
//! front matter, plus any supporting files. Each skill is exposed as:
//!
//! - `skill://<name>/SKILL.md`: the main file, as `text/markdown`
//! - `skill://<name>/_manifest`: a JSON listing of every file with its size
//!   and `sha256:` hash
//! - `skill://<name>/{path*}`: a template named `<name>_files` serving the
//!   supporting files
//!
//! With [`SupportingFiles::Resources`] the supporting files are listed as
//! concrete resources instead of through the template.
//!
//! ```text
//! skills/
//! ├── pdf-tools/
//! │   ├── SKILL.md
//! │   └── scripts/extract.py
//! └── style-guide/
//!     └── SKILL.md
//! ```

use crate::component::{
    Component, ComponentKind, Resource, ResourceContent, ResourceReader, ResourceTemplate, TemplateParams,
    TemplateReader,
};
use crate::component::{Prompt, Tool};
use crate::context::CallContext;
use crate::error::{ProviderError, ResourceError};
use crate::notify;
use crate::provider::Provider;
use anyhow::Context as _;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Component as PathComponent, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Name of the main file every skill directory must contain.
pub const MAIN_FILE: &str = "SKILL.md";

const MANIFEST: &str = "_manifest";

/// How supporting files are exposed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportingFiles {
    /// Through one `skill://<name>/{path*}` template per skill
    #[default]
    Template,
    /// As one concrete resource per file
    Resources,
}

/// YAML front matter of a `SKILL.md` file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct FrontMatter {
    description: Option<String>,
    version: Option<String>,
    tags: Vec<String>,
}

/// One file inside a skill directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillFile {
    /// Path relative to the skill directory, `/`-separated
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// Content hash, `sha256:<hex>`
    pub hash: String,
}

/// A scanned skill.
#[derive(Debug, Clone)]
pub struct Skill {
    name: String,
    description: Option<String>,
    version: Option<String>,
    tags: Vec<String>,
    dir: PathBuf,
    files: Vec<SkillFile>,
}

impl Skill {
    /// Loads the skill in `dir`. The skill name is the directory name.
    ///
    /// # Errors
    ///
    /// Fails if `SKILL.md` is missing or unreadable, or its front matter is
    /// not valid YAML.
    pub fn load(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir
            .as_ref()
            .canonicalize()
            .with_context(|| format!("Failed to resolve skill directory {}", dir.as_ref().display()))?;
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("Skill directory has no name: {}", dir.display()))?;

        let main = dir.join(MAIN_FILE);
        let content = std::fs::read_to_string(&main)
            .with_context(|| format!("Failed to read {}", main.display()))?;
        let (front, body) = parse_front_matter(&content)
            .with_context(|| format!("Invalid front matter in {}", main.display()))?;

        let description = front.description.or_else(|| first_heading(body));
        let files = scan_files(&dir)?;

        Ok(Self {
            name,
            description,
            version: front.version,
            tags: front.tags,
            dir,
            files,
        })
    }

    /// Returns the skill name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description from front matter, or the first heading.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the version from front matter.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Returns the tags from front matter.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the canonical skill directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns every file, sorted by path.
    pub fn files(&self) -> &[SkillFile] {
        &self.files
    }

    /// Returns the manifest served at `skill://<name>/_manifest`.
    pub fn manifest(&self) -> serde_json::Value {
        serde_json::json!({
            "skill": self.name,
            "files": self.files,
        })
    }

    fn uri(&self, path: &str) -> String {
        format!("skill://{}/{}", self.name, path)
    }

    /// Resolves a relative path inside the skill directory. Paths that
    /// leave the directory, directly or through a symlink, are rejected.
    async fn resolve(&self, relative: &str) -> Result<PathBuf, ResourceError> {
        let candidate = Path::new(relative);
        let plain = !relative.is_empty()
            && candidate
                .components()
                .all(|part| matches!(part, PathComponent::Normal(_)));
        if !plain {
            return Err(ResourceError::InvalidUri(format!(
                "path '{}' is outside skill '{}'",
                relative, self.name
            )));
        }

        let resolved = tokio::fs::canonicalize(self.dir.join(candidate))
            .await
            .map_err(|_| ResourceError::NotFound(self.uri(relative)))?;
        if !resolved.starts_with(&self.dir) {
            return Err(ResourceError::InvalidUri(format!(
                "path '{}' is outside skill '{}'",
                relative, self.name
            )));
        }
        Ok(resolved)
    }

    fn main_resource(self: &Arc<Self>) -> Resource {
        let resource = Resource::from_arc(
            self.uri(MAIN_FILE),
            Arc::new(FileReader {
                path: self.dir.join(MAIN_FILE),
                mime_type: "text/markdown",
            }),
        )
        .with_name(format!("{}/{}", self.name, MAIN_FILE))
        .with_mime_type("text/markdown")
        .with_tags(self.tags.iter().cloned());
        self.describe(resource)
    }

    fn manifest_resource(self: &Arc<Self>) -> Resource {
        Resource::from_arc(self.uri(MANIFEST), Arc::new(ManifestReader(self.clone())))
            .with_name(format!("{}/{}", self.name, MANIFEST))
            .with_mime_type("application/json")
            .with_description(format!("File listing for skill '{}'", self.name))
    }

    fn file_resources(self: &Arc<Self>) -> Vec<Resource> {
        self.files
            .iter()
            .filter(|file| file.path != MAIN_FILE)
            .map(|file| {
                let mime_type = guess_mime_type(&file.path);
                Resource::from_arc(
                    self.uri(&file.path),
                    Arc::new(FileReader {
                        path: self.dir.join(&file.path),
                        mime_type,
                    }),
                )
                .with_name(format!("{}/{}", self.name, file.path))
                .with_mime_type(mime_type)
            })
            .collect()
    }

    fn files_template(self: &Arc<Self>) -> Result<ResourceTemplate, ResourceError> {
        Ok(ResourceTemplate::new(
            format!("skill://{}/{{path*}}", self.name),
            FilesReader(self.clone()),
        )?
        .with_name(format!("{}_files", self.name))
        .with_description(format!("Supporting files of skill '{}'", self.name)))
    }

    fn describe<C: Component>(&self, component: C) -> C {
        let component = match &self.description {
            Some(description) => component.with_description(description.clone()),
            None => component,
        };
        match &self.version {
            Some(version) => component.with_version(version.clone()),
            None => component,
        }
    }
}

/// Splits `content` into front matter and body. Content without a leading
/// `---` fence has empty front matter.
fn parse_front_matter(content: &str) -> Result<(FrontMatter, &str), serde_yaml::Error> {
    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return Ok((FrontMatter::default(), content));
    };

    let (yaml, body) = match rest.find("\n---") {
        Some(end) => {
            let after = &rest[end + 4..];
            let body = after.split_once('\n').map_or("", |(_, body)| body);
            (&rest[..end], body)
        }
        None => return Ok((FrontMatter::default(), content)),
    };

    if yaml.trim().is_empty() {
        return Ok((FrontMatter::default(), body));
    }
    Ok((serde_yaml::from_str(yaml)?, body))
}

fn first_heading(body: &str) -> Option<String> {
    body.lines()
        .find_map(|line| line.trim().strip_prefix("# "))
        .map(|heading| heading.trim().to_string())
        .filter(|heading| !heading.is_empty())
}

fn scan_files(dir: &Path) -> anyhow::Result<Vec<SkillFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).with_context(|| {
            format!("{} is not inside {}", entry.path().display(), dir.display())
        })?;
        let path = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let bytes = std::fs::read(entry.path()).with_context(|| format!("Failed to read {}", entry.path().display()))?;
        files.push(SkillFile {
            path,
            size: bytes.len() as u64,
            hash: format!("sha256:{:x}", Sha256::digest(&bytes)),
        });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn guess_mime_type(path: &str) -> &'static str {
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("md") | Some("markdown") => "text/markdown",
        Some("txt") => "text/plain",
        Some("json") => "application/json",
        Some("yaml") | Some("yml") => "application/yaml",
        Some("py") => "text/x-python",
        Some("sh") => "text/x-shellscript",
        Some("html") | Some("htm") => "text/html",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

async fn read_file(path: &Path, mime_type: &str) -> Result<ResourceContent, ResourceError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ResourceError::ReadFailed(format!("{}: {}", path.display(), e)))?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) if mime_type == "application/octet-stream" => ResourceContent::text(text, "text/plain"),
        Ok(text) => ResourceContent::text(text, mime_type),
        Err(e) => ResourceContent::blob(e.into_bytes(), mime_type),
    })
}

struct FileReader {
    path: PathBuf,
    mime_type: &'static str,
}

#[async_trait]
impl ResourceReader for FileReader {
    async fn read(&self, _ctx: &CallContext) -> Result<ResourceContent, ResourceError> {
        read_file(&self.path, self.mime_type).await
    }
}

struct ManifestReader(Arc<Skill>);

#[async_trait]
impl ResourceReader for ManifestReader {
    async fn read(&self, _ctx: &CallContext) -> Result<ResourceContent, ResourceError> {
        let text = serde_json::to_string_pretty(&self.0.manifest()).map_err(anyhow::Error::from)?;
        Ok(ResourceContent::text(text, "application/json"))
    }
}

struct FilesReader(Arc<Skill>);

#[async_trait]
impl TemplateReader for FilesReader {
    async fn read(&self, params: &TemplateParams, _ctx: &CallContext) -> Result<ResourceContent, ResourceError> {
        let relative = params.get("path").map(String::as_str).unwrap_or_default();
        let path = self.0.resolve(relative).await?;
        read_file(&path, guess_mime_type(relative)).await
    }
}

#[derive(Default)]
struct Catalog {
    skills: Vec<Arc<Skill>>,
    resources: Vec<Resource>,
    templates: Vec<ResourceTemplate>,
}

impl Catalog {
    fn build(skills: Vec<Skill>, supporting: SupportingFiles) -> Result<Self, ProviderError> {
        let mut catalog = Catalog::default();
        for skill in skills {
            let skill = Arc::new(skill);
            catalog.resources.push(skill.main_resource());
            catalog.resources.push(skill.manifest_resource());
            match supporting {
                SupportingFiles::Template => catalog
                    .templates
                    .push(skill.files_template().map_err(|e| ProviderError::Upstream(e.into()))?),
                SupportingFiles::Resources => catalog.resources.extend(skill.file_resources()),
            }
            catalog.skills.push(skill);
        }
        Ok(catalog)
    }
}

enum Source {
    /// A directory whose subdirectories are skills
    Root(PathBuf),
    /// A single skill directory
    Single(PathBuf),
}

/// Serves skills from the filesystem.
///
/// The directory is scanned on construction and on [`reload`](Self::reload);
/// file contents are read on demand.
///
/// # Examples
///
/// ```
/// use mcp_router::component::Component;
/// use mcp_router::provider::{Provider, SkillsProvider};
///
/// # tokio_test::block_on(async {
/// let root = tempfile::tempdir().unwrap();
/// let skill = root.path().join("greeting");
/// std::fs::create_dir(&skill).unwrap();
/// std::fs::write(skill.join("SKILL.md"), "---\ndescription: Say hello\n---\n# Greeting\n").unwrap();
///
/// let provider = SkillsProvider::scan(root.path()).unwrap();
/// let resources = provider.list_resources().await.unwrap();
/// let uris: Vec<&str> = resources.iter().map(|r| r.uri()).collect();
/// assert_eq!(uris, vec!["skill://greeting/SKILL.md", "skill://greeting/_manifest"]);
/// # });
/// ```
pub struct SkillsProvider {
    source: Source,
    supporting: SupportingFiles,
    catalog: RwLock<Catalog>,
}

impl fmt::Debug for SkillsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.skills().iter().map(|s| s.name.clone()).collect();
        f.debug_struct("SkillsProvider")
            .field("supporting", &self.supporting)
            .field("skills", &names)
            .finish()
    }
}

impl SkillsProvider {
    /// Scans `root` for skill directories.
    ///
    /// Subdirectories without a `SKILL.md`, or whose `SKILL.md` cannot be
    /// loaded, are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Fails if `root` cannot be read.
    pub fn scan(root: impl Into<PathBuf>) -> Result<Self, ProviderError> {
        Self::with_source(Source::Root(root.into()), SupportingFiles::default())
    }

    /// Serves the single skill in `dir`.
    ///
    /// # Errors
    ///
    /// Fails if the skill cannot be loaded.
    pub fn single(dir: impl Into<PathBuf>) -> Result<Self, ProviderError> {
        Self::with_source(Source::Single(dir.into()), SupportingFiles::default())
    }

    /// Switches how supporting files are exposed.
    pub fn with_supporting_files(mut self, supporting: SupportingFiles) -> Result<Self, ProviderError> {
        self.supporting = supporting;
        self.reload()?;
        Ok(self)
    }

    fn with_source(source: Source, supporting: SupportingFiles) -> Result<Self, ProviderError> {
        let provider = Self {
            source,
            supporting,
            catalog: RwLock::new(Catalog::default()),
        };
        provider.reload()?;
        Ok(provider)
    }

    /// Rescans the filesystem. Returns the number of skills found.
    ///
    /// Notifies the current session that the resource list changed.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be read.
    pub fn reload(&self) -> Result<usize, ProviderError> {
        let skills = match &self.source {
            Source::Root(root) => load_root(root)?,
            Source::Single(dir) => vec![Skill::load(dir)?],
        };
        let catalog = Catalog::build(skills, self.supporting)?;
        let count = catalog.skills.len();
        *self.catalog.write() = catalog;

        debug!(skills = count, "Loaded skills");
        notify::dispatch([ComponentKind::Resource, ComponentKind::Template]);
        Ok(count)
    }

    /// Returns the loaded skills, sorted by name.
    pub fn skills(&self) -> Vec<Arc<Skill>> {
        self.catalog.read().skills.clone()
    }

    /// Returns the skill called `name`.
    pub fn skill(&self, name: &str) -> Option<Arc<Skill>> {
        self.catalog.read().skills.iter().find(|s| s.name == name).cloned()
    }
}

fn load_root(root: &Path) -> Result<Vec<Skill>, ProviderError> {
    let entries = std::fs::read_dir(root).with_context(|| format!("Failed to read skills root {}", root.display()))?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    let mut skills = Vec::new();
    for dir in dirs {
        if !dir.join(MAIN_FILE).is_file() {
            debug!(dir = %dir.display(), "No {} found, skipping", MAIN_FILE);
            continue;
        }
        match Skill::load(&dir) {
            Ok(skill) => skills.push(skill),
            Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to load skill, skipping"),
        }
    }
    Ok(skills)
}

#[async_trait]
impl Provider for SkillsProvider {
    fn name(&self) -> &str {
        "skills"
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, ProviderError> {
        Ok(Vec::new())
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, ProviderError> {
        Ok(self.catalog.read().resources.clone())
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, ProviderError> {
        Ok(self.catalog.read().templates.clone())
    }

    async fn list_prompts(&self) -> Result<Vec<Prompt>, ProviderError> {
        Ok(Vec::new())
    }
}
