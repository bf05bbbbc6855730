//! File-based stroke storage for native platforms.

use super::{BoxFuture, InkPersistence, StorageError, StorageResult};
use crate::clock::now_ms;
use crate::stroke::{AttemptId, DocumentId, SessionId, Stroke};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// File-based stroke storage.
///
/// Strokes of one (session, document) pair live in a single JSON array at
/// `<base>/<session>/<document>.json`.
pub struct FileInkStorage {
    /// Base directory for stroke storage.
    base_path: PathBuf,
}

/// Make an id safe to use as a path component.
fn sanitize(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if safe.is_empty() { "_".to_string() } else { safe }
}

fn read_strokes(path: &Path) -> StorageResult<Vec<Stroke>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let json = fs::read_to_string(path)
        .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&json)
        .map_err(|e| StorageError::Serialization(format!("Failed to parse {}: {}", path.display(), e)))
}

fn write_strokes(path: &Path, strokes: &[Stroke]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| StorageError::Io(format!("Failed to create {}: {}", parent.display(), e)))?;
    }
    let json = serde_json::to_string(strokes).map_err(|e| StorageError::Serialization(e.to_string()))?;
    fs::write(path, json).map_err(|e| StorageError::Io(format!("Failed to write {}: {}", path.display(), e)))
}

fn sort_strokes(strokes: &mut [Stroke]) {
    strokes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

impl FileInkStorage {
    /// Create a new file storage with the given base directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StorageError::Io(format!("Failed to create storage directory: {}", e))
            })?;
        }
        Ok(Self { base_path })
    }

    /// Get the base path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn context_path(&self, session_id: &SessionId, document_id: &DocumentId) -> PathBuf {
        self.base_path
            .join(sanitize(session_id.as_str()))
            .join(format!("{}.json", sanitize(document_id.as_str())))
    }

    /// Every context file under the base directory.
    fn all_files(&self) -> StorageResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !self.base_path.exists() {
            return Ok(files);
        }
        let sessions = fs::read_dir(&self.base_path)
            .map_err(|e| StorageError::Io(format!("Failed to read directory: {}", e)))?;
        for session in sessions.flatten() {
            let session_path = session.path();
            if !session_path.is_dir() {
                continue;
            }
            let documents = fs::read_dir(&session_path)
                .map_err(|e| StorageError::Io(format!("Failed to read directory: {}", e)))?;
            for entry in documents.flatten() {
                let path = entry.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }
}

impl InkPersistence for FileInkStorage {
    fn list_by_session_and_document(
        &self,
        session_id: &SessionId,
        document_id: &DocumentId,
    ) -> BoxFuture<'_, StorageResult<Vec<Stroke>>> {
        let path = self.context_path(session_id, document_id);
        Box::pin(async move {
            let mut strokes = read_strokes(&path)?;
            sort_strokes(&mut strokes);
            Ok(strokes)
        })
    }

    fn list_by_attempt(&self, attempt_id: &AttemptId) -> BoxFuture<'_, StorageResult<Vec<Stroke>>> {
        let attempt_id = attempt_id.clone();
        Box::pin(async move {
            let mut out = Vec::new();
            for path in self.all_files()? {
                out.extend(read_strokes(&path)?.into_iter().filter(|s| s.attempt_id == attempt_id));
            }
            sort_strokes(&mut out);
            Ok(out)
        })
    }

    fn save(&self, stroke: &Stroke) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.context_path(&stroke.session_id, &stroke.document_id);
        let stroke = stroke.clone();
        Box::pin(async move {
            let mut strokes = read_strokes(&path)?;
            match strokes.iter_mut().find(|s| s.id == stroke.id) {
                Some(existing) => *existing = stroke,
                None => strokes.push(stroke),
            }
            write_strokes(&path, &strokes)
        })
    }

    fn delete(&self, strokes: &[Stroke]) -> BoxFuture<'_, StorageResult<()>> {
        let mut by_file: Vec<(PathBuf, HashSet<String>)> = Vec::new();
        for stroke in strokes {
            let path = self.context_path(&stroke.session_id, &stroke.document_id);
            match by_file.iter_mut().find(|(p, _)| *p == path) {
                Some((_, ids)) => {
                    ids.insert(stroke.id.0.clone());
                }
                None => by_file.push((path, HashSet::from([stroke.id.0.clone()]))),
            }
        }
        Box::pin(async move {
            for (path, ids) in by_file {
                if !path.exists() {
                    continue;
                }
                let mut stored = read_strokes(&path)?;
                stored.retain(|s| !ids.contains(s.id.as_str()));
                write_strokes(&path, &stored)?;
            }
            Ok(())
        })
    }

    fn translate_attempt(&self, attempt_id: &AttemptId, dx: f64, dy: f64) -> BoxFuture<'_, StorageResult<()>> {
        let attempt_id = attempt_id.clone();
        Box::pin(async move {
            let now = now_ms();
            for path in self.all_files()? {
                let mut strokes = read_strokes(&path)?;
                let mut touched = false;
                for stroke in strokes.iter_mut().filter(|s| s.attempt_id == attempt_id) {
                    stroke.translate(dx, dy, now);
                    touched = true;
                }
                if touched {
                    write_strokes(&path, &strokes)?;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use crate::stroke::test_support::stroke;
    use pollster::block_on;
    use tempfile::tempdir;

    fn ctx() -> (SessionId, DocumentId) {
        (SessionId::from("session"), DocumentId::from("document"))
    }

    #[test]
    fn test_file_storage_save_load() {
        let dir = tempdir().unwrap();
        let storage = FileInkStorage::new(dir.path()).unwrap();
        let mut s = stroke("s1", "a1", 10, &[(0.0, 0.0), (3.0, 4.0)]);
        // Stored boxes are returned verbatim.
        s.bbox = BoundingBox::new(-0.5, -0.5, 3.5, 4.5);
        block_on(storage.save(&s)).unwrap();

        let (session, document) = ctx();
        let loaded = block_on(storage.list_by_session_and_document(&session, &document)).unwrap();
        assert_eq!(loaded, vec![s]);
    }

    #[test]
    fn test_file_storage_missing_context_is_empty() {
        let dir = tempdir().unwrap();
        let storage = FileInkStorage::new(dir.path().join("nested")).unwrap();
        let (session, document) = ctx();
        let loaded = block_on(storage.list_by_session_and_document(&session, &document)).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_file_storage_save_replaces() {
        let dir = tempdir().unwrap();
        let storage = FileInkStorage::new(dir.path()).unwrap();
        let mut s = stroke("s1", "a1", 10, &[(0.0, 0.0), (3.0, 4.0)]);
        block_on(storage.save(&s)).unwrap();
        s.color = "#2563eb".to_string();
        block_on(storage.save(&s)).unwrap();
        let loaded = block_on(storage.list_by_attempt(&AttemptId::from("a1"))).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].color, "#2563eb");
    }

    #[test]
    fn test_file_storage_delete_and_translate() {
        let dir = tempdir().unwrap();
        let storage = FileInkStorage::new(dir.path()).unwrap();
        let a = stroke("a", "a1", 10, &[(0.0, 0.0), (1.0, 1.0)]);
        let b = stroke("b", "a1", 20, &[(2.0, 2.0), (3.0, 3.0)]);
        let mut c = stroke("c", "a1", 30, &[(0.0, 0.0), (1.0, 1.0)]);
        c.document_id = DocumentId::from("page two");
        for s in [&a, &b, &c] {
            block_on(storage.save(s)).unwrap();
        }

        block_on(storage.delete(&[a])).unwrap();
        block_on(storage.translate_attempt(&AttemptId::from("a1"), 1.0, 1.0)).unwrap();

        let all = block_on(storage.list_by_attempt(&AttemptId::from("a1"))).unwrap();
        let ids: Vec<&str> = all.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["b", "c"]);
        assert_eq!(all[0].bbox, BoundingBox::new(3.0, 3.0, 4.0, 4.0));
        assert_eq!(all[1].bbox, BoundingBox::new(1.0, 1.0, 2.0, 2.0));
    }

    #[test]
    fn test_file_storage_corrupt_file() {
        let dir = tempdir().unwrap();
        let storage = FileInkStorage::new(dir.path()).unwrap();
        let (session, document) = ctx();
        let path = storage.context_path(&session, &document);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();
        let result = block_on(storage.list_by_session_and_document(&session, &document));
        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a/b c"), "a_b_c");
        assert_eq!(sanitize(""), "_");
    }
}
