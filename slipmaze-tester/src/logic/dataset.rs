use regex::Regex;
use slipmaze_core::MazeLoader;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::LazyLock;

static MAZE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^-]*-(\d+)").expect("maze number pattern"));

/// Loads maze files from a dataset directory.
///
/// Only files whose name contains `maze` are listed; they are ordered by the
/// number following the first `-` (`maze-2.txt` before `maze-10.txt`).
#[derive(Debug, Clone)]
pub struct FsMazeLoader {
    root: PathBuf,
}

impl FsMazeLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl MazeLoader for FsMazeLoader {
    type Error = io::Error;

    fn list_mazes(&self) -> Result<Vec<String>, Self::Error> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.contains("maze") {
                names.push(name);
            }
        }
        sort_mazes(&mut names);
        log::debug!("found {} mazes in {}", names.len(), self.root.display());
        Ok(names)
    }

    fn load_maze_text(&self, name: &str) -> Result<String, Self::Error> {
        fs::read_to_string(self.root.join(name))
    }
}

/// Number after the first `-` of a maze file name.
pub fn maze_number(name: &str) -> Option<u64> {
    MAZE_NUMBER
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Numbered mazes first in numeric order, then the rest by name.
pub fn sort_mazes(names: &mut [String]) {
    names.sort_by(|a, b| {
        let key_a = (maze_number(a).is_none(), maze_number(a));
        let key_b = (maze_number(b).is_none(), maze_number(b));
        key_a.cmp(&key_b).then_with(|| a.cmp(b))
    });
}
