//! Integration tests for the buffer pool manager

use std::sync::Arc;
use std::thread;

use bptdb::buffer::BufferPoolManager;
use bptdb::common::{DbError, PageId, PAGE_SIZE};
use bptdb::index::LeafPage;
use bptdb::storage::disk::DiskManager;
use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::open(temp_file.path()).unwrap());
    let bpm = BufferPoolManager::new(pool_size, 2, dm);
    (bpm, temp_file)
}

/// Allocates a page and stamps `tag` into its first byte.
fn new_tagged_page(bpm: &BufferPoolManager, tag: u8) -> PageId {
    let mut guard = bpm.new_page().unwrap();
    guard.data_mut()[0] = tag;
    guard.page_id()
}

#[test]
fn test_buffer_pool_basic_operations() {
    let (bpm, _temp) = create_bpm(10);

    // Page 0 is the store header, so the first data page is 1
    let page_id = bpm.new_page().unwrap().page_id();
    assert_eq!(page_id, PageId::new(1));

    {
        let mut guard = bpm.write_page(page_id).unwrap();
        guard[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    {
        let guard = bpm.read_page(page_id).unwrap();
        assert_eq!(&guard[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }
}

#[test]
fn test_buffer_pool_persistence() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let page_id;
    let test_data = b"Persistence test data";

    {
        let dm = Arc::new(DiskManager::open(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);

        let mut guard = bpm.new_page().unwrap();
        page_id = guard.page_id();
        guard.data_mut()[..test_data.len()].copy_from_slice(test_data);
        drop(guard);

        assert!(bpm.flush_page(page_id).unwrap());
    }

    {
        let dm = Arc::new(DiskManager::open(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);

        let guard = bpm.read_page(page_id).unwrap();
        assert_eq!(&guard.data()[..test_data.len()], test_data);
    }
}

#[test]
fn test_buffer_pool_eviction_writes_back() {
    let (bpm, _temp) = create_bpm(3);

    let page_ids: Vec<_> = (0..3).map(|i| new_tagged_page(&bpm, i)).collect();
    for &pid in &page_ids {
        assert_eq!(bpm.get_pin_count(pid), Some(0));
    }

    // A fourth page forces an eviction
    let new_pid = new_tagged_page(&bpm, 3);
    assert_eq!(new_pid, PageId::new(4));

    // The evicted page comes back from disk with its contents
    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.read_page(pid).unwrap();
        assert_eq!(guard[0], i as u8);
    }
}

#[test]
fn test_buffer_pool_pin_prevents_eviction() {
    let (bpm, _temp) = create_bpm(2);

    let pid1 = new_tagged_page(&bpm, 1);
    let pid2 = new_tagged_page(&bpm, 2);

    let _guard1 = bpm.read_page(pid1).unwrap();
    let _guard2 = bpm.read_page(pid2).unwrap();

    assert!(matches!(bpm.new_page(), Err(DbError::BufferPoolFull)));

    let pid3 = bpm.disk_manager().allocate_page().unwrap();
    assert!(matches!(bpm.read_page(pid3), Err(DbError::BufferPoolFull)));
}

#[test]
fn test_buffer_pool_delete_page_frees_it() {
    let (bpm, _temp) = create_bpm(10);

    let pid = new_tagged_page(&bpm, 42);
    bpm.delete_page(pid).unwrap();

    assert_eq!(bpm.get_pin_count(pid), None);
    assert_eq!(bpm.disk_manager().free_pages().unwrap(), vec![pid]);

    // Deleted contents never reach the reused page
    let reused = bpm.new_page().unwrap();
    assert_eq!(reused.page_id(), pid);
    assert_eq!(reused[0], 0);
}

#[test]
fn test_buffer_pool_cannot_delete_pinned_page() {
    let (bpm, _temp) = create_bpm(10);

    let pid = new_tagged_page(&bpm, 1);
    let _guard = bpm.read_page(pid).unwrap();

    let result = bpm.delete_page(pid);
    assert!(matches!(result, Err(DbError::PageStillPinned(_))));
}

#[test]
fn test_buffer_pool_flush_page_blocked_by_writer() {
    let (bpm, _temp) = create_bpm(4);

    let pid = new_tagged_page(&bpm, 1);
    let _writer = bpm.write_page(pid).unwrap();

    assert!(matches!(
        bpm.flush_page(pid),
        Err(DbError::PageStillPinned(_))
    ));
    assert!(!bpm.flush_page(PageId::new(99)).unwrap());
}

#[test]
fn test_buffer_pool_flush_all() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let page_ids;

    {
        let dm = Arc::new(DiskManager::open(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);

        page_ids = (0..5).map(|i| new_tagged_page(&bpm, i)).collect::<Vec<_>>();
        bpm.flush_all_pages().unwrap();
    }

    {
        let dm = Arc::new(DiskManager::open(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);

        for (i, &pid) in page_ids.iter().enumerate() {
            let guard = bpm.read_page(pid).unwrap();
            assert_eq!(guard[0], i as u8);
        }
    }
}

#[test]
fn test_buffer_pool_concurrent_readers() {
    let (bpm, _temp) = create_bpm(10);
    let bpm = Arc::new(bpm);

    let page_id = new_tagged_page(&bpm, 7);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                for _ in 0..100 {
                    let guard = bpm.read_page(page_id).unwrap();
                    assert_eq!(guard[0], 7);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(bpm.get_pin_count(page_id), Some(0));
}

#[test]
fn test_buffer_pool_with_leaf_pages() {
    let (bpm, _temp) = create_bpm(10);

    let page_id = {
        let mut guard = bpm.new_page().unwrap();
        let mut leaf = LeafPage::new(guard.data_mut());
        leaf.init();
        leaf.insert_at(0, 1, b"first");
        leaf.insert_at(1, 2, b"second");
        guard.page_id()
    };

    let guard = bpm.read_page(page_id).unwrap();
    let leaf = LeafPage::new(guard.data());
    assert_eq!(leaf.num_keys(), 2);
    assert_eq!(leaf.value_at(0), b"first");
    assert_eq!(leaf.value_at(1), b"second");
}

#[test]
fn test_buffer_pool_large_workload() {
    let (bpm, _temp) = create_bpm(5); // Small pool to force evictions

    let page_ids: Vec<_> = (0..20).map(|_| bpm.new_page().unwrap().page_id()).collect();

    for &pid in &page_ids {
        let mut guard = bpm.write_page(pid).unwrap();
        guard[..4].copy_from_slice(&pid.as_u32().to_le_bytes());
    }

    for &pid in &page_ids {
        let guard = bpm.read_page(pid).unwrap();
        let id_bytes: [u8; 4] = guard[..4].try_into().unwrap();
        assert_eq!(u32::from_le_bytes(id_bytes), pid.as_u32());
        assert_eq!(guard.data().len(), PAGE_SIZE);
    }

    assert_eq!(bpm.pinned_frame_count(), 0);
}
