//! Idle-detection collaborator: how many processes currently hold the output
//! sink open. The encoder itself is one of them, so "idle" means a count of
//! one or less.

use std::path::Path;

pub trait SinkProbe: Send {
    fn open_reader_count(&self, sink: &Path) -> usize;
}

/// Walks `/proc/<pid>/fd` and counts processes with the sink open. Pids we
/// cannot inspect (permissions, races with exiting processes) are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcScanProbe;

impl SinkProbe for ProcScanProbe {
    fn open_reader_count(&self, sink: &Path) -> usize {
        let Ok(canonical) = sink.canonicalize() else {
            return 0;
        };
        let Ok(proc_entries) = std::fs::read_dir("/proc") else {
            return 0;
        };

        let mut count = 0;
        for entry in proc_entries.flatten() {
            let name = entry.file_name();
            if !name.to_string_lossy().chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            let fd_dir = entry.path().join("fd");
            let Ok(fds) = std::fs::read_dir(&fd_dir) else {
                continue;
            };
            let holds_sink = fds.flatten().any(|fd| {
                std::fs::read_link(fd.path())
                    .map(|target| target == canonical)
                    .unwrap_or(false)
            });
            if holds_sink {
                count += 1;
            }
        }
        count
    }
}
