// Shared test doubles: an in-memory Dropbox and a scripted prompter.
#![allow(dead_code)]

use anyhow::Result;
use dropbox_purge::api::{
    DeleteLaunch, Entry, EntryTag, JobStatus, ListFolderPage, StorageApi, ThumbnailRequest,
    ThumbnailResult,
};
use dropbox_purge::cancel::CancelToken;
use dropbox_purge::ApiError;
use dropbox_purge::ui::Prompter;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

pub struct FakeDropbox {
    folders: HashMap<String, Vec<Entry>>,
    missing: HashSet<String>,
    launch: DeleteLaunch,
    statuses: RefCell<VecDeque<JobStatus>>,
    interrupt: Option<(usize, CancelToken)>,
    pub list_calls: Cell<usize>,
    pub thumbnail_calls: Cell<usize>,
    pub status_checks: Cell<usize>,
    pub deleted: RefCell<Vec<Vec<String>>>,
}

impl FakeDropbox {
    pub fn new() -> Self {
        Self {
            folders: HashMap::new(),
            missing: HashSet::new(),
            launch: DeleteLaunch::Complete,
            statuses: RefCell::new(VecDeque::new()),
            interrupt: None,
            list_calls: Cell::new(0),
            thumbnail_calls: Cell::new(0),
            status_checks: Cell::new(0),
            deleted: RefCell::new(Vec::new()),
        }
    }

    /// Add a folder; names ending in '/' are subfolders.
    pub fn folder(mut self, path: &str, children: &[&str]) -> Self {
        let entries = children
            .iter()
            .map(|child| {
                let (name, tag) = match child.strip_suffix('/') {
                    Some(name) => (name, EntryTag::Folder),
                    None => (*child, EntryTag::File),
                };
                let full = format!("{}/{}", path, name);
                Entry {
                    tag,
                    id: format!("id:{}", full),
                    name: name.to_string(),
                    path_lower: full.to_lowercase(),
                    path_display: full,
                }
            })
            .collect();
        self.folders.insert(path.to_lowercase(), entries);
        self
    }

    pub fn missing(mut self, path: &str) -> Self {
        self.missing.insert(path.to_string());
        self
    }

    pub fn async_job(mut self, statuses: Vec<JobStatus>) -> Self {
        self.launch = DeleteLaunch::AsyncJob("dbjid:fake".into());
        self.statuses = RefCell::new(statuses.into());
        self
    }

    /// Cancel `token` while answering the `calls`-th listing request,
    /// the way a Ctrl-C lands mid-listing.
    pub fn interrupt_after(mut self, calls: usize, token: CancelToken) -> Self {
        self.interrupt = Some((calls, token));
        self
    }

    fn page(&self, path: &str, offset: usize, limit: usize) -> Result<ListFolderPage, ApiError> {
        self.list_calls.set(self.list_calls.get() + 1);
        if let Some((calls, token)) = &self.interrupt {
            if self.list_calls.get() == *calls {
                token.cancel();
            }
        }
        if self.missing.contains(path) {
            return Err(ApiError::Status {
                endpoint: "files/list_folder".into(),
                status: 409,
                summary: "path/not_found/..".into(),
            });
        }
        let all = self.folders.get(path).cloned().unwrap_or_default();
        let end = (offset + limit).min(all.len());
        Ok(ListFolderPage {
            entries: all[offset..end].to_vec(),
            cursor: format!("{}|{}|{}", path, end, limit),
            has_more: end < all.len(),
        })
    }
}

impl StorageApi for FakeDropbox {
    fn list_folder(&self, path: &str, limit: u32, _: bool) -> Result<ListFolderPage, ApiError> {
        self.page(path, 0, limit as usize)
    }

    fn list_folder_continue(&self, cursor: &str) -> Result<ListFolderPage, ApiError> {
        let mut parts = cursor.rsplitn(3, '|');
        let limit = parts.next().unwrap().parse().unwrap();
        let offset = parts.next().unwrap().parse().unwrap();
        let path = parts.next().unwrap();
        self.page(path, offset, limit)
    }

    fn get_thumbnail_batch(&self, entries: &[ThumbnailRequest]) -> Result<Vec<ThumbnailResult>, ApiError> {
        self.thumbnail_calls.set(self.thumbnail_calls.get() + 1);
        Ok(entries
            .iter()
            .map(|e| ThumbnailResult::Success {
                name: e.path.rsplit('/').next().unwrap_or_default().to_string(),
                bytes: vec![0xff, 0xd8, 0xff],
            })
            .collect())
    }

    fn delete_batch(&self, paths: &[String]) -> Result<DeleteLaunch, ApiError> {
        self.deleted.borrow_mut().push(paths.to_vec());
        Ok(self.launch.clone())
    }

    fn delete_batch_check(&self, _: &str) -> Result<JobStatus, ApiError> {
        self.status_checks.set(self.status_checks.get() + 1);
        let mut statuses = self.statuses.borrow_mut();
        if statuses.len() > 1 {
            Ok(statuses.pop_front().unwrap())
        } else {
            Ok(statuses.front().cloned().unwrap_or(JobStatus::Complete))
        }
    }
}

/// Answers prompts from fixed lists and records what was asked.
#[derive(Default)]
pub struct ScriptedPrompter {
    pub texts: VecDeque<String>,
    pub secrets: VecDeque<String>,
    pub confirms: VecDeque<bool>,
    pub asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn confirming(answers: &[bool]) -> Self {
        Self {
            confirms: answers.iter().copied().collect(),
            ..Self::default()
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn secret(&mut self, prompt: &str) -> Result<String> {
        self.asked.push(prompt.to_string());
        Ok(self.secrets.pop_front().expect("unexpected secret prompt"))
    }

    fn text(&mut self, prompt: &str) -> Result<String> {
        self.asked.push(prompt.to_string());
        Ok(self.texts.pop_front().expect("unexpected text prompt"))
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        self.asked.push(prompt.to_string());
        Ok(self.confirms.pop_front().expect("unexpected confirm prompt"))
    }
}
