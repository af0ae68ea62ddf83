use crate::core::store::{ListenerId, Store};
use crate::core::token_budget::{DEFAULT_MAX_TOKENS, TokenBudget, classify};
use crate::domain::error::{PtahError, Result};
use crate::domain::models::{ContextFile, FileTreeNode};
use crate::infra::host_bridge::{HostBridge, Subscription, types};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextTreeState {
    pub roots: Vec<FileTreeNode>,
    pub total_tokens: u64,
    pub max_tokens: u64,
    pub loading: bool,
    pub error: Option<String>,
    pub expanded_paths: BTreeSet<String>,
}

impl Default for ContextTreeState {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            total_tokens: 0,
            max_tokens: DEFAULT_MAX_TOKENS,
            loading: false,
            error: None,
            expanded_paths: BTreeSet::new(),
        }
    }
}

/// Entries of the host file list may be bare paths or file objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum FileEntry {
    Path(String),
    File(ContextFile),
}

impl From<FileEntry> for ContextFile {
    fn from(entry: FileEntry) -> Self {
        match entry {
            FileEntry::Path(path) => ContextFile::new(path),
            FileEntry::File(file) => file,
        }
    }
}

struct FilesPayload {
    files: Vec<ContextFile>,
    included: BTreeSet<String>,
    excluded: BTreeSet<String>,
}

fn parse_files_payload(payload: &Value) -> Result<FilesPayload> {
    let entries = payload
        .get("files")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            PtahError::MalformedPayload("file list is missing or not an array".to_string())
        })?;

    let files = entries
        .iter()
        .map(|entry| {
            serde_json::from_value::<FileEntry>(entry.clone())
                .map(ContextFile::from)
                .map_err(|e| PtahError::MalformedPayload(format!("invalid file entry: {}", e)))
        })
        .collect::<Result<Vec<_>>>()?;

    let path_set = |key: &str| -> BTreeSet<String> {
        payload
            .get(key)
            .and_then(Value::as_array)
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    Ok(FilesPayload {
        files,
        included: path_set("includedFiles"),
        excluded: path_set("excludedFiles"),
    })
}

fn path_segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect()
}

/// `./a//b.txt` and `a/b.txt` name the same node.
pub fn normalize_path(path: &str) -> String {
    path_segments(path).join("/")
}

fn add_file_to_tree(
    roots: &mut Vec<FileTreeNode>,
    file: &ContextFile,
    included: &BTreeSet<String>,
    excluded: &BTreeSet<String>,
    expanded: &BTreeSet<String>,
) {
    let segments = path_segments(&file.path);
    if segments.is_empty() {
        return;
    }

    let dirs_count = segments.len() - 1;
    let mut current = roots;

    for (depth, segment) in segments.iter().enumerate() {
        if depth == dirs_count {
            let mut node = FileTreeNode::new_file(file, segment.to_string(), depth);
            node.included = included.contains(&file.path);
            node.excluded = !node.included && excluded.contains(&file.path);
            current.push(node);
            break;
        }

        let pos = current
            .iter()
            .position(|child| child.is_directory() && child.name == *segment);

        let index = match pos {
            Some(pos) => pos,
            None => {
                let dir_path = segments[..=depth].join("/");
                let mut dir = FileTreeNode::new_directory(dir_path, segment.to_string(), depth);
                dir.expanded = expanded.contains(&dir.path);
                current.push(dir);
                current.len() - 1
            }
        };
        current = &mut current[index].children;
    }
}

/// Build the hierarchy from a listing already sorted by full path.
pub fn build_tree(
    files: &[ContextFile],
    included: &BTreeSet<String>,
    excluded: &BTreeSet<String>,
    expanded: &BTreeSet<String>,
) -> Vec<FileTreeNode> {
    let mut roots = Vec::new();
    for file in files {
        add_file_to_tree(&mut roots, file, included, excluded, expanded);
    }
    roots
}

/// Depth-first search by path.
pub fn find_node<'a>(nodes: &'a [FileTreeNode], path: &str) -> Option<&'a FileTreeNode> {
    for node in nodes {
        if node.path == path {
            return Some(node);
        }
        if let Some(found) = find_node(&node.children, path) {
            return Some(found);
        }
    }
    None
}

fn collect_files<'a>(node: &'a FileTreeNode, out: &mut Vec<&'a FileTreeNode>) {
    if node.is_file() {
        out.push(node);
    }
    for child in &node.children {
        collect_files(child, out);
    }
}

pub fn included_tokens(nodes: &[FileTreeNode]) -> u64 {
    nodes
        .iter()
        .map(|node| {
            let own = if node.is_file() && node.included {
                node.token_estimate.unwrap_or(0)
            } else {
                0
            };
            own + included_tokens(&node.children)
        })
        .sum()
}

/// Pre-order walk that only descends into expanded directories.
/// A clone replays from the current position; call [`flatten`] again for a
/// fresh pass.
#[derive(Clone)]
pub struct Flatten<'a> {
    stack: Vec<&'a FileTreeNode>,
    expanded: &'a BTreeSet<String>,
}

impl<'a> Iterator for Flatten<'a> {
    type Item = &'a FileTreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if node.is_directory() && self.expanded.contains(&node.path) {
            self.stack.extend(node.children.iter().rev());
        }
        Some(node)
    }
}

pub fn flatten<'a>(roots: &'a [FileTreeNode], expanded: &'a BTreeSet<String>) -> Flatten<'a> {
    Flatten {
        stack: roots.iter().rev().collect(),
        expanded,
    }
}

pub struct ContextTreeManager {
    bridge: Rc<HostBridge>,
    subscription: Subscription,
    store: Store<ContextTreeState>,
    files: Vec<ContextFile>,
    included: BTreeSet<String>,
    excluded: BTreeSet<String>,
}

impl ContextTreeManager {
    pub fn new(bridge: Rc<HostBridge>, max_tokens: u64) -> Self {
        let subscription = bridge
            .subscribe()
            .with_types(&[types::CONTEXT_FILES_LOADED, types::CONTEXT_ERROR]);
        Self {
            bridge,
            subscription,
            store: Store::new(ContextTreeState {
                max_tokens,
                ..ContextTreeState::default()
            }),
            files: Vec::new(),
            included: BTreeSet::new(),
            excluded: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> &ContextTreeState {
        self.store.get()
    }

    pub fn subscribe(&mut self, listener: impl Fn(&ContextTreeState) + 'static) -> ListenerId {
        self.store.subscribe(listener)
    }

    pub fn request_files(&mut self) {
        self.store.update(|state| {
            state.loading = true;
            state.error = None;
        });
        self.bridge.post(types::CONTEXT_GET_FILES, None);
    }

    /// Drain pending host messages addressed to the context tree.
    pub fn poll_host(&mut self) {
        while let Some(message) = self.subscription.try_next() {
            let data = message.data.unwrap_or(Value::Null);
            if message.kind == types::CONTEXT_FILES_LOADED {
                if let Err(e) = self.load_files(&data) {
                    warn!("Rejected context file list: {}", e);
                }
            } else {
                let text = data
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| data.as_str())
                    .unwrap_or("Failed to load context files")
                    .to_string();
                self.fail(text);
            }
        }
    }

    fn fail(&mut self, message: String) {
        self.store.update(|state| {
            state.error = Some(message);
            state.loading = false;
        });
    }

    /// Load a host file-list payload. A malformed payload records the error
    /// and keeps the previous tree.
    pub fn load_files(&mut self, payload: &Value) -> Result<()> {
        match parse_files_payload(payload) {
            Ok(parsed) => {
                self.load(parsed.files, parsed.included, parsed.excluded);
                Ok(())
            }
            Err(e) => {
                self.fail(e.to_string());
                Err(e)
            }
        }
    }

    pub fn load(
        &mut self,
        mut files: Vec<ContextFile>,
        included: BTreeSet<String>,
        excluded: BTreeSet<String>,
    ) {
        for file in &mut files {
            file.path = normalize_path(&file.path);
        }
        files.retain(|file| !file.path.is_empty());
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files.dedup_by(|a, b| a.path == b.path);
        info!("Loaded {} context files", files.len());

        let included: BTreeSet<String> = included.iter().map(|p| normalize_path(p)).collect();
        self.files = files;
        self.excluded = excluded
            .iter()
            .map(|p| normalize_path(p))
            .filter(|path| !included.contains(path))
            .collect();
        self.included = included;
        self.rebuild(|state| {
            state.loading = false;
            state.error = None;
        });
    }

    fn rebuild(&mut self, extra: impl FnOnce(&mut ContextTreeState)) {
        let files = &self.files;
        let included = &self.included;
        let excluded = &self.excluded;
        self.store.update(|state| {
            extra(state);
            state.roots = build_tree(files, included, excluded, &state.expanded_paths);
            state.total_tokens = included_tokens(&state.roots);
        });
        debug!("Context total tokens: {}", self.store.get().total_tokens);
    }

    fn set_inclusion(&mut self, path: &str, include: bool) {
        if include {
            self.excluded.remove(path);
            self.included.insert(path.to_string());
            self.bridge
                .post(types::CONTEXT_INCLUDE_FILE, Some(json!({ "filePath": path })));
        } else {
            self.included.remove(path);
            self.excluded.insert(path.to_string());
            self.bridge
                .post(types::CONTEXT_EXCLUDE_FILE, Some(json!({ "filePath": path })));
        }
    }

    /// Flip inclusion of a file. Returns false for directories and unknown paths.
    pub fn toggle_file(&mut self, path: &str) -> bool {
        let include = match find_node(&self.state().roots, path) {
            Some(node) if node.is_file() => !node.included,
            _ => return false,
        };
        self.set_inclusion(path, include);
        self.rebuild(|_| {});
        true
    }

    /// Expand or collapse a directory for rendering. Inclusion is untouched.
    pub fn toggle_directory(&mut self, path: &str) -> bool {
        match find_node(&self.state().roots, path) {
            Some(node) if node.is_directory() => {}
            _ => return false,
        }
        let path = path.to_string();
        self.rebuild(move |state| {
            if !state.expanded_paths.remove(&path) {
                state.expanded_paths.insert(path);
            }
        });
        true
    }

    pub fn expand_all(&mut self) {
        let mut dirs = Vec::new();
        for node in flatten_all(&self.state().roots) {
            if node.is_directory() {
                dirs.push(node.path.clone());
            }
        }
        self.rebuild(|state| state.expanded_paths.extend(dirs));
    }

    fn descendant_files(&self, path: Option<&str>, included: bool) -> Vec<String> {
        let mut files = Vec::new();
        match path {
            Some(path) => match find_node(&self.state().roots, path) {
                Some(node) if node.is_directory() => collect_files(node, &mut files),
                _ => {}
            },
            None => {
                for root in &self.state().roots {
                    collect_files(root, &mut files);
                }
            }
        }
        files
            .into_iter()
            .filter(|file| file.included == included)
            .map(|file| file.path.clone())
            .collect()
    }

    fn bulk_set(&mut self, path: Option<&str>, include: bool) -> usize {
        let targets = self.descendant_files(path, !include);
        for target in &targets {
            self.set_inclusion(target, include);
        }
        if !targets.is_empty() {
            self.rebuild(|_| {});
        }
        debug!(
            "{} {} files under {}",
            if include { "Included" } else { "Excluded" },
            targets.len(),
            path.unwrap_or("<root>")
        );
        targets.len()
    }

    /// Include every not-yet-included file under `path`, one host message each.
    pub fn include_directory(&mut self, path: &str) -> usize {
        self.bulk_set(Some(path), true)
    }

    /// Exclude every included file under `path`, one host message each.
    pub fn exclude_directory(&mut self, path: &str) -> usize {
        self.bulk_set(Some(path), false)
    }

    pub fn include_all(&mut self) -> usize {
        self.bulk_set(None, true)
    }

    pub fn exclude_all(&mut self) -> usize {
        self.bulk_set(None, false)
    }

    pub fn flatten(&self) -> Flatten<'_> {
        let state = self.state();
        flatten(&state.roots, &state.expanded_paths)
    }

    pub fn budget(&self) -> TokenBudget {
        let state = self.state();
        classify(state.total_tokens, state.max_tokens)
    }

    pub fn included_files(&self) -> Vec<&ContextFile> {
        self.files
            .iter()
            .filter(|file| self.included.contains(&file.path))
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

fn flatten_all(roots: &[FileTreeNode]) -> Vec<&FileTreeNode> {
    let mut out = Vec::new();
    fn walk<'a>(node: &'a FileTreeNode, out: &mut Vec<&'a FileTreeNode>) {
        out.push(node);
        for child in &node.children {
            walk(child, out);
        }
    }
    for root in roots {
        walk(root, &mut out);
    }
    out
}
