//! Persisted placement-id counter for the graphics protocols.
//!
//! Ids label image placements for the Kitty/iTerm2 back-ends; uniqueness
//! only matters within a terminal session, so the id space wraps at
//! 65536 and no file locking is taken (last writer wins).

use std::io::Write;
use std::path::PathBuf;

pub struct PlacementCounter {
    id: u32,
    path: Option<PathBuf>,
}

fn default_state_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("textel").join("placement-id"))
}

impl PlacementCounter {
    /// Restores the last persisted id (from `$XDG_CACHE_HOME/textel/
    /// placement-id` by default). Missing or unparsable state resets to
    /// the beginning of the range.
    pub fn new() -> Self {
        Self::with_path(default_state_path())
    }

    pub fn with_path(path: Option<PathBuf>) -> Self {
        let mut counter = Self { id: 0, path };
        counter.ensure_storage();
        counter.restore();
        counter
    }

    /// The next id in [1, 65536], advancing and wrapping.
    pub fn next_id(&mut self) -> u32 {
        self.id = (self.id % 65536) + 1;
        self.id
    }

    fn ensure_storage(&self) {
        let Some(parent) = self.path.as_ref().and_then(|p| p.parent()) else {
            return;
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let _ = std::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o750)
                .create(parent);
        }
        #[cfg(not(unix))]
        {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    fn restore(&mut self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Ok(contents) = std::fs::read_to_string(path) {
            if let Ok(id) = contents.trim().parse::<u32>() {
                if id >= 1 {
                    self.id = id;
                }
            }
        }
    }

    fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let result = std::fs::File::create(path)
            .and_then(|mut f| writeln!(f, "{}", self.id));
        if let Err(err) = result {
            log::warn!("could not persist placement id: {}", err);
        }
    }
}

impl Default for PlacementCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlacementCounter {
    fn drop(&mut self) {
        self.save();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_one_without_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("placement-id");
        let mut counter = PlacementCounter::with_path(Some(path));
        assert_eq!(counter.next_id(), 1);
        assert_eq!(counter.next_id(), 2);
    }

    #[test]
    fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("placement-id");

        {
            let mut counter = PlacementCounter::with_path(Some(path.clone()));
            counter.next_id();
            counter.next_id();
            counter.next_id();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "3\n");

        let mut counter = PlacementCounter::with_path(Some(path));
        assert_eq!(counter.next_id(), 4);
    }

    #[test]
    fn garbage_state_resets_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("placement-id");
        std::fs::write(&path, "not a number\n").unwrap();

        let mut counter = PlacementCounter::with_path(Some(path));
        assert_eq!(counter.next_id(), 1);
    }

    #[test]
    fn wraps_after_65536() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("placement-id");
        std::fs::write(&path, "65536\n").unwrap();

        let mut counter = PlacementCounter::with_path(Some(path));
        assert_eq!(counter.next_id(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn creates_parent_directories_restrictively() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("placement-id");
        let _ = PlacementCounter::with_path(Some(path.clone()));

        let mode = std::fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o750);
    }
}
