use crate::simulation::error::SimError;
use crate::simulation::events::{EventTrait, EventsSubscriber};
use std::any::Any;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Writes one json object per line and event.
pub struct JsonEventsWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonEventsWriter {
    pub fn new(path: &Path) -> Result<Self, SimError> {
        let io_err = |source| SimError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = File::create(path).map_err(io_err)?;
        info!("Writing events to {path:?}");
        Ok(JsonEventsWriter {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }
}

impl EventsSubscriber for JsonEventsWriter {
    fn receive_event(&mut self, event: &dyn EventTrait) {
        let result = serde_json::to_writer(&mut self.writer, &event.to_json())
            .map_err(std::io::Error::from)
            .and_then(|_| self.writer.write_all(b"\n"));
        if let Err(e) = result {
            error!("Failed to write event {event:?} to {:?}: {e}", self.path);
        }
    }

    fn finish(&mut self) {
        info!("Finishing events file. Calling flush on buffered writer.");
        if let Err(e) = self.writer.flush() {
            error!("Failed to flush events to {:?}: {e}", self.path);
        }
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}
