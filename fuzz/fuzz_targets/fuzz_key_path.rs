//! Fuzz target for key to path mapping.
//!
//! Whatever the key, the staging file name is one plain segment and a
//! directory-store path never escapes its root.

#![no_main]

use libfuzzer_sys::fuzz_target;
use object_sync::store::FsStore;
use object_sync::Key;
use std::path::{Component, Path};

fuzz_target!(|data: &str| {
    let key = Key::from(data);

    let name = key.file_name();
    assert!(!name.is_empty() && !name.contains('/'));
    assert!(name != "." && name != "..");

    let store = FsStore::new("/srv/objects");
    if let Ok(path) = store.object_path(&key) {
        let relative = path.strip_prefix(Path::new("/srv/objects")).expect("path under root");
        assert!(relative.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir)));
    }
});
