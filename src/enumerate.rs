// Folder enumeration
// ------------------
// Walks a remote folder tree page by page and collects every file into a
// flat list. Each folder (the root included) is one branch; a branch may
// span several pages linked by a cursor. Branches are scheduled on a
// queue owned by the `Enumerator`, so the file list and the outstanding
// branch count are plain fields and need no locking.

use crate::api::{EntryTag, ListFolderPage, StorageApi};
use crate::cancel::CancelToken;
use crate::error::ApiError;
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// Page size requested from the listing endpoint.
pub const FILE_FETCH_LIMIT: u32 = 50;

/// A file found during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub path_lower: String,
    pub path_display: String,
}

/// What an enumeration run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumerationReport {
    /// Files in discovery order.
    pub files: Vec<FileRecord>,
    /// Branches started, one per folder visited.
    pub branches_started: usize,
    /// Branches abandoned after a listing error.
    pub branches_failed: usize,
    /// Branches dropped unfinished because the run was cancelled.
    pub branches_cancelled: usize,
    /// Listing requests that returned a page.
    pub pages_fetched: usize,
    /// File and folder entries seen across all pages.
    pub entries_seen: usize,
}

impl EnumerationReport {
    /// True when every branch was listed to its last page.
    pub fn is_complete(&self) -> bool {
        self.branches_failed == 0 && self.branches_cancelled == 0
    }
}

/// Next request to issue for a branch.
#[derive(Debug)]
enum Step {
    List { path: String },
    Continue { path: String, cursor: String },
}

type FileObserver<'a> = Box<dyn FnMut(&FileRecord) + 'a>;

pub struct Enumerator<'a, A: StorageApi + ?Sized> {
    api: &'a A,
    page_limit: u32,
    pending: VecDeque<Step>,
    outstanding: usize,
    finished: bool,
    report: EnumerationReport,
    on_file: Option<FileObserver<'a>>,
    cancel: CancelToken,
}

impl<'a, A: StorageApi + ?Sized> Enumerator<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self {
            api,
            page_limit: FILE_FETCH_LIMIT,
            pending: VecDeque::new(),
            outstanding: 0,
            finished: false,
            report: EnumerationReport::default(),
            on_file: None,
            cancel: CancelToken::new(),
        }
    }

    /// Override the page size (mainly for tests).
    pub fn page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    /// Called once for every file as it is discovered.
    pub fn on_file(mut self, observer: impl FnMut(&FileRecord) + 'a) -> Self {
        self.on_file = Some(Box::new(observer));
        self
    }

    /// Stop issuing requests once `cancel` is set.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Enumerate everything under `root` and return once every branch has
    /// finished, successfully or not.
    pub fn run(mut self, root: &str) -> EnumerationReport {
        self.list_folder(normalize_root(root));

        while let Some(step) = self.pending.pop_front() {
            if self.cancel.is_cancelled() {
                self.abandon(step);
                continue;
            }
            let (path, result) = match step {
                Step::List { path } => {
                    let res = self.api.list_folder(&path, self.page_limit, false);
                    (path, res)
                }
                Step::Continue { path, cursor } => {
                    let res = self.api.list_folder_continue(&cursor);
                    (path, res)
                }
            };
            self.handle_response(path, result);
        }

        debug_assert_eq!(self.outstanding, 0);
        debug_assert!(self.finished);
        debug!(
            files = self.report.files.len(),
            branches = self.report.branches_started,
            failed = self.report.branches_failed,
            "enumeration finished"
        );
        self.report
    }

    /// Run the enumeration and hand the result to `then`, exactly once.
    pub fn run_then<T>(self, root: &str, then: impl FnOnce(EnumerationReport) -> T) -> T {
        let report = self.run(root);
        then(report)
    }

    /// Start a new branch for `path`.
    fn list_folder(&mut self, path: String) {
        self.outstanding += 1;
        self.report.branches_started += 1;
        trace!(%path, outstanding = self.outstanding, "branch started");
        self.pending.push_back(Step::List { path });
    }

    /// Every live branch has exactly one queued step, so dropping a step
    /// ends its branch.
    fn abandon(&mut self, step: Step) {
        let path = match step {
            Step::List { path } | Step::Continue { path, .. } => path,
        };
        debug!(%path, "listing cancelled");
        self.report.branches_cancelled += 1;
        self.finish_branch(&path);
    }

    /// Continue an existing branch; the branch count is unchanged.
    fn continue_listing(&mut self, path: String, cursor: String) {
        self.pending.push_back(Step::Continue { path, cursor });
    }

    fn handle_response(&mut self, path: String, result: Result<ListFolderPage, ApiError>) {
        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(%path, error = %e, "listing failed, skipping folder");
                self.report.branches_failed += 1;
                self.finish_branch(&path);
                return;
            }
        };
        self.report.pages_fetched += 1;

        for entry in page.entries {
            if entry.tag == EntryTag::Deleted {
                trace!(name = %entry.name, "ignoring deleted entry");
                continue;
            }
            // Listing "" would restart at the account root.
            if entry.path_lower.is_empty() {
                warn!(name = %entry.name, tag = ?entry.tag, "entry without a path, skipping");
                continue;
            }
            self.report.entries_seen += 1;
            match entry.tag {
                EntryTag::Folder => self.list_folder(entry.path_lower),
                EntryTag::File => {
                    let record = FileRecord {
                        id: entry.id,
                        name: entry.name,
                        path_lower: entry.path_lower,
                        path_display: entry.path_display,
                    };
                    if let Some(observer) = self.on_file.as_mut() {
                        observer(&record);
                    }
                    self.report.files.push(record);
                }
                EntryTag::Deleted => {}
            }
        }

        if page.has_more {
            self.continue_listing(path, page.cursor);
        } else {
            self.finish_branch(&path);
        }
    }

    fn finish_branch(&mut self, path: &str) {
        self.outstanding -= 1;
        trace!(%path, outstanding = self.outstanding, "branch finished");
        if self.outstanding == 0 {
            debug_assert!(!self.finished, "enumeration completed twice");
            self.finished = true;
        }
    }
}

/// Dropbox names the root folder with the empty string and rejects
/// trailing slashes.
pub fn normalize_root(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
