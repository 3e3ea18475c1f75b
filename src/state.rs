//! The owning context for the displayed tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::dictionary::Dictionary;
use crate::file::open_record;
use crate::scheduler::{ReadyQuery, SearchScheduler};
use crate::search::{normalize_query, search};
use crate::tree::{build, Limits};
use crate::types::{root_label, DisplayNode, DisplayTree, Element, IndexEntry, Record, SearchIndex};
use crate::value::FormatOptions;

/// Holds the loaded record and the tree currently on screen.
///
/// All rebuilds happen here, on the caller's thread; the scheduler only
/// delivers queries. Each rebuild swaps in a whole new [`DisplayTree`].
pub struct Browser {
    source: Option<PathBuf>,
    root_label: String,
    record: Option<Arc<Vec<Element>>>,
    load_error: Option<String>,
    dict: Dictionary,
    format: FormatOptions,
    limits: Limits,
    view: DisplayTree,
    query: String,
    applied_query: String,
    match_count: Option<usize>,
    searches_run: u64,
    scheduler: SearchScheduler,
    ready: UnboundedReceiver<ReadyQuery>,
}

impl Browser {
    pub fn new(
        record: Record,
        limits: Limits,
        scheduler: SearchScheduler,
        ready: UnboundedReceiver<ReadyQuery>,
    ) -> Self {
        let label = record.root_label();
        let view = build(&label, &record.elements, limits);
        Self {
            source: None,
            root_label: label,
            record: Some(Arc::new(record.elements)),
            load_error: None,
            dict: Dictionary::builtin(),
            format: FormatOptions::default(),
            limits,
            view,
            query: String::new(),
            applied_query: String::new(),
            match_count: None,
            searches_run: 0,
            scheduler,
            ready,
        }
    }

    /// Loads `path`; a load failure is shown under the root instead of being returned.
    pub fn open(
        path: &Path,
        dict: Dictionary,
        format: FormatOptions,
        limits: Limits,
        scheduler: SearchScheduler,
        ready: UnboundedReceiver<ReadyQuery>,
    ) -> Self {
        let loaded = load(path, &dict, &format, limits);
        Self {
            source: Some(path.to_path_buf()),
            root_label: loaded.root_label,
            record: loaded.record,
            load_error: loaded.error,
            dict,
            format,
            limits,
            view: loaded.view,
            query: String::new(),
            applied_query: String::new(),
            match_count: None,
            searches_run: 0,
            scheduler,
            ready,
        }
    }

    /// Re-reads the source file and rebuilds the full tree, dropping any active search.
    pub fn reload(&mut self) {
        let Some(path) = self.source.clone() else { return };
        self.scheduler.cancel();
        self.query.clear();
        self.applied_query.clear();
        self.match_count = None;

        let loaded = load(&path, &self.dict, &self.format, self.limits);
        self.root_label = loaded.root_label;
        self.record = loaded.record;
        self.load_error = loaded.error;
        self.view = loaded.view;
    }

    pub fn tree(&self) -> &DisplayTree {
        &self.view
    }

    /// Mutable access to the root, for expand/collapse state only.
    pub fn root_mut(&mut self) -> &mut DisplayNode {
        &mut self.view.root
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn applied_query(&self) -> &str {
        &self.applied_query
    }

    pub fn match_count(&self) -> Option<usize> {
        self.match_count
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn searches_run(&self) -> u64 {
        self.searches_run
    }

    pub fn is_searching(&self) -> bool {
        !normalize_query(&self.applied_query).is_empty()
    }

    pub fn has_pending_search(&self) -> bool {
        self.scheduler.has_pending()
    }

    /// Records an edit of the query text and starts its debounce window.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        if self.record.is_none() {
            return;
        }
        let id = self.scheduler.schedule(self.query.clone());
        debug!(generation = id, query = %self.query, "search scheduled");
    }

    /// Closes the search: cancels anything pending and restores the full tree immediately.
    pub fn clear_search(&mut self) {
        self.scheduler.cancel();
        self.query.clear();
        if self.applied_query.is_empty() && self.match_count.is_none() {
            return;
        }
        self.applied_query.clear();
        self.match_count = None;
        if let Some(elements) = &self.record {
            self.view = build(&self.root_label, elements, self.limits);
            info!("search cleared, full tree restored");
        }
    }

    /// Evaluates the newest delivered query, if any. Returns whether the tree was replaced.
    pub fn pump(&mut self) -> bool {
        let mut latest = None;
        while let Ok(ready) = self.ready.try_recv() {
            if self.scheduler.is_current(ready.generation) {
                latest = Some(ready);
            } else {
                debug!(generation = ready.generation, "dropping superseded search");
            }
        }
        match latest {
            Some(ready) => {
                self.run_search(&ready.query);
                true
            }
            None => false,
        }
    }

    /// Runs `query` right away, bypassing the debounce window.
    pub fn search_now(&mut self, query: &str) {
        self.scheduler.cancel();
        self.query = query.to_string();
        self.run_search(query);
    }

    fn run_search(&mut self, query: &str) {
        let Some(elements) = self.record.clone() else { return };
        let outcome = search(&self.root_label, &elements, query, self.limits);
        self.searches_run += 1;
        self.view = outcome.tree;
        self.match_count = outcome.match_count;
        self.applied_query = normalize_query(query);
        info!(
            query = %self.applied_query,
            matches = ?self.match_count,
            nodes = self.view.index.len(),
            "display tree replaced"
        );
    }

    /// One-line summary for a status bar.
    pub fn status(&self) -> String {
        if let Some(err) = &self.load_error {
            return format!("load failed: {err}");
        }
        let mut status = match self.match_count {
            Some(1) => format!("1 match for \"{}\"", self.applied_query),
            Some(n) => format!("{n} matches for \"{}\"", self.applied_query),
            None => format!("{} nodes", self.view.index.len()),
        };
        if let Some(t) = self.view.truncation {
            status.push_str(&format!(" | {t}"));
        }
        status
    }
}

struct Loaded {
    root_label: String,
    record: Option<Arc<Vec<Element>>>,
    view: DisplayTree,
    error: Option<String>,
}

fn load(path: &Path, dict: &Dictionary, format: &FormatOptions, limits: Limits) -> Loaded {
    match open_record(path, dict, format) {
        Ok(record) => {
            let root_label = record.root_label();
            let elements = Arc::new(record.elements);
            let view = build(&root_label, &elements, limits);
            Loaded {
                root_label,
                record: Some(elements),
                view,
                error: None,
            }
        }
        Err(e) => {
            warn!(error = %e, "record load failed");
            let root_label = root_label(&path.display().to_string());
            let view = failed_tree(&root_label, &e.to_string());
            Loaded {
                root_label,
                record: None,
                view,
                error: Some(e.to_string()),
            }
        }
    }
}

fn failed_tree(root_label: &str, error: &str) -> DisplayTree {
    let notice = DisplayNode::leaf(format!("Error loading file: {error}"));
    let mut index = SearchIndex::default();
    index.insert(notice.id, IndexEntry::neutral(None));
    let mut root = DisplayNode::branch(root_label.to_string(), vec![notice]);
    root.expanded = true;
    index.insert(root.id, IndexEntry::neutral(None));
    DisplayTree {
        root,
        index,
        truncation: None,
    }
}
