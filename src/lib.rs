// Library root
// -----------
// The binary (`main.rs`) wires these modules into the interactive purge.
//
// Module responsibilities:
// - `api`: the `StorageApi` seam and the blocking Dropbox client.
// - `enumerate`: recursive, paginated folder listing.
// - `filter`: regex matching on file names.
// - `preview`: thumbnail download and the HTML preview page.
// - `delete`: batch delete submission and job polling.
// - `cancel`: the Ctrl-C flag both loops check.
// - `config`: command-line flags.
// - `ui`: the prompt-driven flow tying it all together.
pub mod api;
pub mod cancel;
pub mod config;
pub mod delete;
pub mod enumerate;
pub mod error;
pub mod filter;
pub mod preview;
pub mod ui;

pub use api::{ApiClient, StorageApi};
pub use enumerate::{EnumerationReport, Enumerator, FileRecord};
pub use error::{ApiError, PurgeError};
