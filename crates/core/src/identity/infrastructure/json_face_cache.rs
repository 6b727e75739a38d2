use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::domain::cache_error::CacheError;
use crate::identity::domain::encoding::{Encoding, FaceId, NO_FACE};
use crate::identity::domain::face_cache::FaceCache;
use crate::identity::domain::profile::Profile;
use crate::identity::infrastructure::memory_face_cache::MemoryFaceCache;

#[derive(Serialize, Deserialize)]
struct StoreFile {
    /// Missing in files written before the counter was stored.
    #[serde(default = "first_unknown")]
    next_unknown: Option<FaceId>,
    faces: Vec<StoredFace>,
}

#[derive(Serialize, Deserialize)]
struct StoredFace {
    id: FaceId,
    encoding: Encoding,
    #[serde(flatten)]
    profile: Profile,
}

fn first_unknown() -> Option<FaceId> {
    Some(-1)
}

/// Checks the id invariants a hand-edited file may break and returns the
/// counter to resume minting from.
fn checked_counter(file: &StoreFile) -> Result<Option<FaceId>, String> {
    let mut seen = HashSet::with_capacity(file.faces.len());
    for face in &file.faces {
        if face.id == NO_FACE {
            return Err(format!("face id {NO_FACE} is reserved"));
        }
        if !seen.insert(face.id) {
            return Err(format!("face id {} is stored more than once", face.id));
        }
    }

    let Some(next) = file.next_unknown else {
        return Ok(None);
    };
    if next >= 0 {
        return Err(format!("unknown-id counter must be negative, got {next}"));
    }
    match file.faces.iter().map(|f| f.id).filter(|id| *id < 0).min() {
        Some(lowest) if lowest <= next => {
            let resumed = lowest.checked_sub(1);
            log::warn!("Unknown-id counter {next} overlaps stored id {lowest}; resuming below it");
            Ok(resumed)
        }
        _ => Ok(Some(next)),
    }
}

/// Identity store persisted as a JSON file.
///
/// Behaves exactly like [`MemoryFaceCache`] and rewrites the file after every
/// successful mutation. A failed write rolls the mutation back. The minted-id
/// counter is stored too, so negative ids stay unique across runs.
pub struct JsonFaceCache {
    path: PathBuf,
    inner: MemoryFaceCache,
}

impl JsonFaceCache {
    /// Loads the store at `path`, or starts empty if the file does not exist.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let inner = if path.exists() {
            let raw = fs::read_to_string(path).map_err(|source| CacheError::Storage {
                path: path.to_path_buf(),
                source,
            })?;
            let file: StoreFile =
                serde_json::from_str(&raw).map_err(|source| CacheError::Format {
                    path: path.to_path_buf(),
                    source,
                })?;
            let next_unknown = checked_counter(&file).map_err(|reason| CacheError::Format {
                path: path.to_path_buf(),
                source: serde::de::Error::custom(reason),
            })?;
            let mut entries = Vec::with_capacity(file.faces.len());
            let mut profiles = BTreeMap::new();
            for face in file.faces {
                if face.profile != Profile::default() {
                    profiles.insert(face.id, face.profile);
                }
                entries.push((face.id, face.encoding));
            }
            MemoryFaceCache::from_parts(entries, profiles, next_unknown)
        } else {
            MemoryFaceCache::new()
        };
        log::debug!("Opened face store {} ({} faces)", path.display(), inner.len());
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn commit<T>(
        &mut self,
        op: impl FnOnce(&mut MemoryFaceCache) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let snapshot = self.inner.clone();
        let out = op(&mut self.inner)?;
        if let Err(e) = self.save() {
            self.inner = snapshot;
            return Err(e);
        }
        Ok(out)
    }

    /// Writes to a sibling temp file and renames it over the store.
    fn save(&self) -> Result<(), CacheError> {
        let storage_err = |source| CacheError::Storage {
            path: self.path.clone(),
            source,
        };
        let file = StoreFile {
            next_unknown: self.inner.next_unknown(),
            faces: self
                .inner
                .entries()
                .iter()
                .map(|(id, encoding)| StoredFace {
                    id: *id,
                    encoding: encoding.clone(),
                    profile: self.inner.profiles().get(id).cloned().unwrap_or_default(),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|source| CacheError::Format {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(storage_err)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(storage_err)?;
        fs::rename(&tmp, &self.path).map_err(storage_err)?;
        Ok(())
    }
}

impl FaceCache for JsonFaceCache {
    fn insert(&mut self, id: FaceId, encoding: Encoding) -> Result<(), CacheError> {
        self.commit(|c| c.insert(id, encoding))
    }

    fn insert_unknown(&mut self, encoding: Encoding) -> Result<FaceId, CacheError> {
        self.commit(|c| c.insert_unknown(encoding))
    }

    fn remove(&mut self, id: FaceId) -> Result<(), CacheError> {
        self.commit(|c| c.remove(id))
    }

    fn rename(&mut self, old: FaceId, new: FaceId) -> Result<(), CacheError> {
        self.commit(|c| c.rename(old, new))
    }

    fn retrieve(&self, id: FaceId) -> Result<Encoding, CacheError> {
        self.inner.retrieve(id)
    }

    fn query(&self, encoding: &Encoding, tolerance: f64) -> FaceId {
        self.inner.query(encoding, tolerance)
    }

    fn ids(&self) -> Vec<FaceId> {
        self.inner.ids()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn profile(&self, id: FaceId) -> Result<Profile, CacheError> {
        self.inner.profile(id)
    }

    fn set_name(&mut self, id: FaceId, name: Option<String>) -> Result<(), CacheError> {
        self.commit(|c| c.set_name(id, name))
    }

    fn mark_seen(&mut self, id: FaceId, at: DateTime<Utc>) -> Result<(), CacheError> {
        self.commit(|c| c.mark_seen(id, at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn store_path(dir: &Path) -> PathBuf {
        dir.join("faces.json")
    }

    #[test]
    fn test_open_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFaceCache::open(&store_path(dir.path())).unwrap();
        assert!(cache.is_empty());
        assert!(!store_path(dir.path()).exists());
    }

    #[test]
    fn test_mutations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(dir.path());
        {
            let mut cache = JsonFaceCache::open(&path).unwrap();
            cache.insert(1, Encoding::splat(0.1)).unwrap();
            let unknown = cache.insert_unknown(Encoding::splat(0.2)).unwrap();
            assert_eq!(unknown, -1);
        }
        let mut reopened = JsonFaceCache::open(&path).unwrap();
        assert_eq!(reopened.ids(), vec![1, -1]);
        assert_eq!(reopened.retrieve(-1).unwrap(), Encoding::splat(0.2));
        // The counter is persisted, so the next minted id is fresh.
        assert_eq!(reopened.insert_unknown(Encoding::zeros()).unwrap(), -2);
    }

    #[test]
    fn test_rename_and_remove_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(dir.path());
        let mut cache = JsonFaceCache::open(&path).unwrap();
        let unknown = cache.insert_unknown(Encoding::splat(0.3)).unwrap();
        cache.insert(2, Encoding::splat(0.4)).unwrap();
        cache.rename(unknown, 5).unwrap();
        cache.remove(2).unwrap();

        let reopened = JsonFaceCache::open(&path).unwrap();
        assert_eq!(reopened.ids(), vec![5]);
        assert_eq!(reopened.retrieve(5).unwrap(), Encoding::splat(0.3));
    }

    #[test]
    fn test_failed_operation_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(dir.path());
        let mut cache = JsonFaceCache::open(&path).unwrap();
        cache.insert(1, Encoding::zeros()).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        assert!(matches!(
            cache.insert(1, Encoding::splat(1.0)),
            Err(CacheError::DuplicateId(1))
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_unwritable_store_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the store file should be makes the rename fail.
        let path = store_path(dir.path());
        fs::create_dir_all(&path).unwrap();
        let mut cache = JsonFaceCache {
            path: path.clone(),
            inner: MemoryFaceCache::new(),
        };

        let err = cache.insert(3, Encoding::zeros()).unwrap_err();
        assert!(matches!(err, CacheError::Storage { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_malformed_file_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(dir.path());
        fs::write(&path, "{ \"faces\": [ { \"id\": 1, \"encoding\": [1.0] } ] }").unwrap();
        assert!(matches!(
            JsonFaceCache::open(&path),
            Err(CacheError::Format { .. })
        ));
    }

    fn write_store(dir: &Path, faces: &[FaceId], next_unknown: &str) -> PathBuf {
        let path = store_path(dir);
        let encoding = serde_json::to_string(&Encoding::zeros()).unwrap();
        let faces: Vec<String> = faces
            .iter()
            .map(|id| format!(r#"{{ "id": {id}, "encoding": {encoding} }}"#))
            .collect();
        let json = format!(
            r#"{{ {next_unknown} "faces": [ {} ] }}"#,
            faces.join(", ")
        );
        fs::write(&path, json).unwrap();
        path
    }

    #[rstest]
    #[case(&[-1, 0], r#""next_unknown": -1,"#)]
    #[case(&[3, 0], "")]
    fn test_reserved_id_is_rejected(#[case] faces: &[FaceId], #[case] counter: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = write_store(dir.path(), faces, counter);
        let err = JsonFaceCache::open(&path).err().unwrap();
        assert!(matches!(err, CacheError::Format { .. }));
        assert!(err.to_string().contains("reserved"));
    }

    #[rstest]
    #[case(&[2, 2])]
    #[case(&[-1, 4, -1])]
    fn test_duplicate_ids_are_rejected(#[case] faces: &[FaceId]) {
        let dir = tempfile::tempdir().unwrap();
        let path = write_store(dir.path(), faces, "");
        let err = JsonFaceCache::open(&path).err().unwrap();
        assert!(matches!(err, CacheError::Format { .. }));
        assert!(err.to_string().contains("more than once"));
    }

    #[rstest]
    #[case(0)]
    #[case(4)]
    fn test_non_negative_counter_is_rejected(#[case] counter: FaceId) {
        let dir = tempfile::tempdir().unwrap();
        let path = write_store(dir.path(), &[], &format!(r#""next_unknown": {counter},"#));
        let err = JsonFaceCache::open(&path).err().unwrap();
        assert!(matches!(err, CacheError::Format { .. }));
        assert!(err.to_string().contains("must be negative"));
    }

    #[test]
    fn test_stale_counter_resumes_below_stored_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_store(dir.path(), &[-1, 5, -3], r#""next_unknown": -2,"#);
        let mut cache = JsonFaceCache::open(&path).unwrap();
        assert_eq!(cache.insert_unknown(Encoding::splat(1.0)).unwrap(), -4);
        assert_eq!(cache.ids(), vec![-1, 5, -3, -4]);
    }

    #[test]
    fn test_missing_counter_resumes_below_stored_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_store(dir.path(), &[-1, -2], "");
        let mut cache = JsonFaceCache::open(&path).unwrap();
        assert_eq!(cache.insert_unknown(Encoding::splat(1.0)).unwrap(), -3);
    }

    #[test]
    fn test_exhausted_counter_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_store(dir.path(), &[1], r#""next_unknown": null,"#);
        let mut cache = JsonFaceCache::open(&path).unwrap();
        assert!(matches!(
            cache.insert_unknown(Encoding::zeros()),
            Err(CacheError::Exhausted)
        ));
    }

    #[test]
    fn test_profiles_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(dir.path());
        let seen = Utc.with_ymd_and_hms(2019, 4, 12, 9, 30, 0).unwrap();
        {
            let mut cache = JsonFaceCache::open(&path).unwrap();
            cache.insert(1, Encoding::zeros()).unwrap();
            cache.set_name(1, Some("Ada".into())).unwrap();
            let stranger = cache.insert_unknown(Encoding::splat(1.0)).unwrap();
            cache.mark_seen(stranger, seen).unwrap();
        }

        let reopened = JsonFaceCache::open(&path).unwrap();
        assert_eq!(reopened.profile(1).unwrap().name.as_deref(), Some("Ada"));
        let stranger = reopened.profile(-1).unwrap();
        assert_eq!(stranger.name, None);
        assert_eq!(stranger.first_seen, Some(seen));
        assert_eq!(stranger.last_seen, Some(seen));
    }

    #[test]
    fn test_unnamed_faces_store_no_profile_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(dir.path());
        let mut cache = JsonFaceCache::open(&path).unwrap();
        cache.insert(1, Encoding::zeros()).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("name"));
        assert!(!raw.contains("last_seen"));
    }
}
