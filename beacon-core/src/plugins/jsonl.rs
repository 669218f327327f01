//! JSON-lines destination
//!
//! Appends every processed event as one line of JSON to a local file. The
//! file is the hand-off point for whatever ships events onward; this plugin
//! never touches the network.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Plugin, PluginKind};
use crate::types::{AnalyticsEvent, EventType};

/// Plugin name.
pub const NAME: &str = "core.jsonl";

/// Build a destination writing to `path`.
///
/// The parent directory is created when the plugin is loaded; the file is
/// opened lazily on the first event and kept open afterwards.
pub fn destination(path: impl Into<PathBuf>) -> Plugin {
    let writer = Arc::new(JsonLinesWriter::new(path.into()));
    let on_load = Arc::clone(&writer);

    Plugin::new(NAME)
        .with_kind(PluginKind::Destination)
        .with_version(env!("CARGO_PKG_VERSION"))
        .on_load(move |_| on_load.ensure_parent())
        .on_events(&EventType::ALL, move |event| writer.append(event))
}

struct JsonLinesWriter {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonLinesWriter {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: Mutex::new(None),
        }
    }

    fn ensure_parent(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn append(&self, event: &AnalyticsEvent) -> anyhow::Result<()> {
        let mut guard = self.file.lock();
        if guard.is_none() {
            *guard = Some(open_append(&self.path)?);
        }
        if let Some(file) = guard.as_mut() {
            let mut line = serde_json::to_vec(event)?;
            line.push(b'\n');
            file.write_all(&line)?;
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
