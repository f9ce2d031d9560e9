use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use feedstore::core::{Error, ManualClock};
use feedstore::store::ContainerLayout;
use feedstore::volume::{StaticVolumes, Volume};
use feedstore::{Channel, MetaProperties, MetaService, Status, Store, StoreConfig};
use tempfile::tempdir;

fn open_store(root: &Path, clock: Arc<ManualClock>) -> Store {
    let service = MetaService::open(root.join("catalog.json"), clock).expect("catalog");
    let volumes = StaticVolumes::new(vec![Volume::new(root.join("vol"), "node-a", 0, 1 << 30)]);
    let config = StoreConfig {
        block_size: 64,
        ..StoreConfig::default()
    };
    Store::new(config, Arc::new(service), Arc::new(volumes))
}

fn entry_bytes(i: usize, tag: &str, len: usize) -> Vec<u8> {
    (0..len).map(|j| (i * 31 + j * 7 + tag.len()) as u8).collect()
}

#[test]
fn entries_round_trip_byte_for_byte() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path(), Arc::new(ManualClock::new(5_000)));

    let sizes = [0usize, 1, 63, 64, 65, 1_000, 4_096];
    let mut target = store
        .open_target(MetaProperties::new("ROUND_TRIP", "Raw Events"))
        .expect("target");
    assert_eq!(target.meta().status, Status::Locked);
    for (i, &size) in sizes.iter().enumerate() {
        let mut entry = target.next_entry().expect("entry");
        assert_eq!(entry.ordinal() as usize, i + 1);
        entry
            .primary()
            .expect("data")
            .write_all(&entry_bytes(i, "data", size))
            .expect("write data");
        if i % 2 == 0 {
            entry
                .channel(Channel::Context)
                .expect("context")
                .write_all(&entry_bytes(i, "context", size / 2))
                .expect("write context");
        }
        entry
            .channel(Channel::Meta)
            .expect("meta")
            .write_all(format!("Entry:{i}\n").as_bytes())
            .expect("write meta");
        entry.close().expect("close entry");
    }
    let meta = target.close().expect("close");
    assert_eq!(meta.status, Status::Unlocked);

    let source = store.open_source(meta.id, false).expect("source");
    assert_eq!(source.entry_count(), sizes.len());
    for (i, entry) in source.entries().enumerate() {
        assert_eq!(
            entry.read_channel(Channel::Data).expect("data"),
            Some(entry_bytes(i, "data", sizes[i]))
        );
        let context = entry.read_channel(Channel::Context).expect("context");
        if i % 2 == 0 {
            assert_eq!(context, Some(entry_bytes(i, "context", sizes[i] / 2)));
        } else {
            assert_eq!(context, None);
        }
        assert_eq!(
            entry.read_channel(Channel::Meta).expect("meta"),
            Some(format!("Entry:{i}\n").into_bytes())
        );
    }
}

#[test]
fn committed_streams_survive_reopen() {
    let dir = tempdir().expect("tempdir");
    let clock = Arc::new(ManualClock::new(1_000));
    let id = {
        let store = open_store(dir.path(), clock.clone());
        let mut target = store
            .open_target(MetaProperties::new("PERSIST", "Raw Events"))
            .expect("target");
        let mut entry = target.next_entry().expect("entry");
        let data = entry.primary().expect("data");
        for record in ["<a/>", "<b/>", "<c/>"] {
            data.write_all(record.as_bytes()).expect("write");
            data.mark_segment_boundary().expect("mark");
        }
        entry.close().expect("close entry");
        target.close().expect("close").id
    };

    let store = open_store(dir.path(), clock);
    let meta = store.meta_service().get(id).expect("get");
    assert_eq!(meta.status, Status::Unlocked);
    assert_eq!(meta.feed_name, "PERSIST");

    let next = store
        .open_target(MetaProperties::new("PERSIST", "Raw Events"))
        .expect("target");
    assert!(next.meta().id > id);
    drop(next);

    let source = store.open_source(id, false).expect("source");
    let entry = source.entry(0).expect("entry");
    let mut reader = entry.primary().expect("open").expect("data channel");
    assert_eq!(reader.count(), 3);
    reader.include(2).include(0);
    assert_eq!(reader.read().expect("read"), b"<a/><c/>");
}

#[test]
fn entries_are_independent_segment_streams() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path(), Arc::new(ManualClock::new(0)));
    let mut target = store
        .open_target(MetaProperties::new("MULTI", "Events"))
        .expect("target");
    for records in [&["x"][..], &["y1", "y2", "y3"][..]] {
        let mut entry = target.next_entry().expect("entry");
        let data = entry.primary().expect("data");
        for record in records {
            data.write_all(record.as_bytes()).expect("write");
            data.mark_segment_boundary().expect("mark");
        }
        entry.close().expect("close entry");
    }
    let meta = target.close().expect("close");

    let source = store.open_source(meta.id, false).expect("source");
    let counts: Vec<u64> = source
        .entries()
        .map(|entry| entry.primary().expect("open").expect("data").count())
        .collect();
    assert_eq!(counts, vec![1, 3]);
    let mut second = source.entry(1).expect("entry").primary().expect("open").expect("data");
    assert_eq!(second.segment(1).expect("segment"), b"y2");
}

#[test]
fn missing_channel_files_report_the_failing_path() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path(), Arc::new(ManualClock::new(0)));
    let mut target = store
        .open_target(MetaProperties::new("LOST", "Raw Events"))
        .expect("target");
    let mut entry = target.next_entry().expect("entry");
    entry.primary().expect("data").write_all(b"payload").expect("data");
    entry
        .channel(Channel::Meta)
        .expect("meta")
        .write_all(b"Feed:LOST\n")
        .expect("meta");
    entry.close().expect("close entry");
    let meta = target.close().expect("close");

    let layout = ContainerLayout::new(&dir.path().join("vol"), &meta);
    let data = layout.channel_paths(1, Channel::Data);
    let meta_channel = layout.channel_paths(1, Channel::Meta);
    std::fs::remove_file(&data.data).expect("remove data");
    std::fs::remove_file(&meta_channel.segment_index).expect("remove segment index");

    let source = store.open_source(meta.id, false).expect("source");
    let entry = source.entry(0).expect("entry");
    match entry.channel(Channel::Data) {
        Err(Error::StorageIo { path, source }) => {
            assert_eq!(path, data.data);
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("unexpected {:?}", other.map(|r| r.is_some())),
    }
    match entry.channel(Channel::Meta) {
        Err(Error::StorageIo { path, .. }) => assert_eq!(path, meta_channel.segment_index),
        other => panic!("unexpected {:?}", other.map(|r| r.is_some())),
    }
}
