// Thumbnail preview
// -----------------
// Fetches thumbnails for the files about to be deleted, writes them to a
// local directory and builds a small HTML page listing them. Failed
// batches and failed entries are skipped.

use crate::api::{StorageApi, ThumbnailRequest, ThumbnailResult, ThumbnailSize};
use crate::enumerate::FileRecord;
use crate::error::PurgeError;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Entries per thumbnail batch request.
pub const BATCH_SIZE: usize = 25;

/// Characters escaped inside one segment of an `<img src>` URL.
const URL_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'\\');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewOptions {
    /// Directory for the thumbnail files. Emptied before writing.
    pub thumbnail_dir: PathBuf,
    pub html_path: PathBuf,
    /// Open the page in the default viewer once written.
    pub open_viewer: bool,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            thumbnail_dir: PathBuf::from("thumbnails"),
            html_path: PathBuf::from("preview.html"),
            open_viewer: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preview {
    pub html_path: PathBuf,
    pub thumbnails: Vec<PathBuf>,
    pub failed_batches: usize,
    pub failed_entries: usize,
}

/// Fetch, write and index thumbnails for `files`.
pub fn generate_preview<A: StorageApi + ?Sized>(
    api: &A,
    files: &[FileRecord],
    options: &PreviewOptions,
) -> Result<Preview, PurgeError> {
    let mut preview = Preview {
        html_path: options.html_path.clone(),
        ..Preview::default()
    };

    // Every batch settles before anything is written.
    let settled: Vec<_> = files
        .chunks(BATCH_SIZE)
        .map(|chunk| {
            let entries: Vec<_> = chunk
                .iter()
                .map(|f| ThumbnailRequest {
                    path: f.path_lower.clone(),
                    size: ThumbnailSize::W128H128,
                })
                .collect();
            api.get_thumbnail_batch(&entries)
        })
        .collect();

    prepare_dir(&options.thumbnail_dir)?;

    let html_dir = options.html_path.parent().unwrap_or_else(|| Path::new(""));
    let mut items = Vec::new();
    for batch in settled {
        let results = match batch {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "thumbnail batch failed");
                preview.failed_batches += 1;
                continue;
            }
        };
        for result in results {
            match result {
                ThumbnailResult::Success { name, bytes } => {
                    let path = options.thumbnail_dir.join(format!("{}.jpg", name));
                    fs::write(&path, bytes)?;
                    let src = path.strip_prefix(html_dir).unwrap_or(&path);
                    items.push((image_src(src), name));
                    preview.thumbnails.push(path);
                }
                ThumbnailResult::Failure { reason } => {
                    debug!(%reason, "no thumbnail");
                    preview.failed_entries += 1;
                }
            }
        }
    }

    fs::write(&options.html_path, render_html(files.len(), &items))?;
    info!(
        thumbnails = preview.thumbnails.len(),
        path = %options.html_path.display(),
        "preview written"
    );
    Ok(preview)
}

/// Create `dir`, or remove everything inside it if it already exists.
fn prepare_dir(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        return fs::create_dir_all(dir);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Relative file path to a URL, each segment percent-encoded.
fn image_src(path: &Path) -> String {
    let segments: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => {
                Some(utf8_percent_encode(&s.to_string_lossy(), URL_SEGMENT).to_string())
            }
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect();
    let joined = segments.join("/");
    if path.has_root() {
        format!("file:///{}", joined)
    } else {
        joined
    }
}

fn render_html(total: usize, items: &[(String, String)]) -> String {
    let mut html = format!(
        "<html><body><div><h1>{} files will be deleted</h1>",
        total
    );
    for (src, name) in items {
        html.push_str(&format!(
            "<div><img src=\"{}\"/><p>{}</p></div>",
            escape_html(src),
            escape_html(name)
        ));
    }
    html.push_str("</div></body></html>");
    html
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Open `path` with the platform's default handler.
pub fn open_in_viewer(path: &Path) -> Result<(), opener::OpenError> {
    opener::open(path)
}
