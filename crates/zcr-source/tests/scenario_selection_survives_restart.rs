use zcr_source::*;

#[test]
fn file_store_round_trips_key_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("selected_source.txt");

    let mut first = FileSelectionStore::new(&path);
    assert_eq!(first.load().unwrap(), None);
    first.save("osc#2").unwrap();

    // A new process opens the same file.
    let second = FileSelectionStore::new(&path);
    assert_eq!(second.load().unwrap().as_deref(), Some("osc#2"));
}

#[test]
fn file_store_overwrites_previous_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("selected_source.txt");

    let mut store = FileSelectionStore::new(&path);
    store.save("osc#0").unwrap();
    store.save("trend#1").unwrap();
    assert_eq!(store.load().unwrap().as_deref(), Some("trend#1"));
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn blank_file_means_no_selection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("selected_source.txt");
    std::fs::write(&path, "  \n").unwrap();

    let store = FileSelectionStore::new(&path);
    assert_eq!(store.load().unwrap(), None);
}

#[test]
fn memory_store_holds_last_saved_key() {
    let mut store = MemorySelectionStore::with_key("osc#0");
    assert_eq!(store.load().unwrap().as_deref(), Some("osc#0"));
    store.save("osc#3").unwrap();
    assert_eq!(store.load().unwrap().as_deref(), Some("osc#3"));
}
