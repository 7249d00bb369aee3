use super::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use tempfile::tempdir;

// -------------------- Helpers --------------------

fn rec(v: u32) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

fn values(list: &mut RecordList) -> Vec<u32> {
    list.read_all()
        .unwrap()
        .into_iter()
        .map(|r| u32::from_be_bytes([r[0], r[1], r[2], r[3]]))
        .collect()
}

fn filled(path: &Path, vals: &[u32]) -> RecordList {
    let mut list = RecordList::open(path, 4).unwrap();
    for v in vals {
        list.append(&rec(*v)).unwrap();
    }
    list
}

// -------------------- Open --------------------

#[test]
fn open_creates_empty_list() {
    let dir = tempdir().unwrap();
    let list = RecordList::open(dir.path().join("a.idx"), 6).unwrap();
    assert_eq!(list.len(), 0);
    assert!(list.is_empty());
    assert_eq!(list.item_len(), 6);
}

#[test]
fn open_counts_existing_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.idx");
    fs::write(&path, [0u8; 18]).unwrap();

    let list = RecordList::open(&path, 6).unwrap();
    assert_eq!(list.len(), 3);
}

#[test]
fn open_rejects_partial_record() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.idx");
    fs::write(&path, [0u8; 13]).unwrap();

    match RecordList::open(&path, 6) {
        Err(RecordListError::Corrupt { size, item_len, .. }) => {
            assert_eq!(size, 13);
            assert_eq!(item_len, 6);
        }
        other => panic!("expected Corrupt, got {:?}", other),
    }
}

#[test]
fn open_rejects_zero_width() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        RecordList::open(dir.path().join("a.idx"), 0),
        Err(RecordListError::Io(_))
    ));
}

// -------------------- get / set / append --------------------

#[test]
fn append_then_get() {
    let dir = tempdir().unwrap();
    let mut list = filled(&dir.path().join("a.idx"), &[7, 8, 9]);
    assert_eq!(list.len(), 3);
    assert_eq!(list.get(0).unwrap(), rec(7));
    assert_eq!(list.get(2).unwrap(), rec(9));
}

#[test]
fn get_out_of_range() {
    let dir = tempdir().unwrap();
    let mut list = filled(&dir.path().join("a.idx"), &[1]);
    assert!(matches!(
        list.get(1),
        Err(RecordListError::OutOfRange { index: 1, len: 1 })
    ));
}

#[test]
fn set_overwrites_in_place() {
    let dir = tempdir().unwrap();
    let mut list = filled(&dir.path().join("a.idx"), &[1, 2, 3]);
    list.set(1, &rec(20)).unwrap();
    assert_eq!(values(&mut list), vec![1, 20, 3]);
    assert_eq!(list.len(), 3);
}

#[test]
fn set_rejects_bad_index_and_width() {
    let dir = tempdir().unwrap();
    let mut list = filled(&dir.path().join("a.idx"), &[1]);
    assert!(matches!(
        list.set(1, &rec(5)),
        Err(RecordListError::OutOfRange { .. })
    ));
    assert!(matches!(
        list.set(0, &[1, 2]),
        Err(RecordListError::LengthMismatch {
            expected: 4,
            actual: 2
        })
    ));
}

#[test]
fn append_rejects_bad_width() {
    let dir = tempdir().unwrap();
    let mut list = RecordList::open(dir.path().join("a.idx"), 4).unwrap();
    assert!(matches!(
        list.append(&[1, 2, 3, 4, 5]),
        Err(RecordListError::LengthMismatch { .. })
    ));
    assert_eq!(list.len(), 0);
}

// -------------------- insert --------------------

#[test]
fn insert_shifts_tail_right() {
    let dir = tempdir().unwrap();
    let original = [10, 11, 12, 13, 14];

    for i in 0..=original.len() {
        let path = dir.path().join(format!("ins-{}.idx", i));
        let mut list = filled(&path, &original);
        list.insert(i, &rec(99)).unwrap();

        let got = values(&mut list);
        assert_eq!(got.len(), original.len() + 1);
        assert_eq!(&got[..i], &original[..i]);
        assert_eq!(got[i], 99);
        assert_eq!(&got[i + 1..], &original[i..]);
        assert_eq!(list.len(), original.len() + 1);
    }
}

#[test]
fn insert_into_empty() {
    let dir = tempdir().unwrap();
    let mut list = RecordList::open(dir.path().join("a.idx"), 4).unwrap();
    list.insert(0, &rec(5)).unwrap();
    assert_eq!(values(&mut list), vec![5]);
}

#[test]
fn insert_past_end_fails() {
    let dir = tempdir().unwrap();
    let mut list = filled(&dir.path().join("a.idx"), &[1, 2]);
    assert!(matches!(
        list.insert(3, &rec(5)),
        Err(RecordListError::OutOfRange { index: 3, len: 2 })
    ));
    assert_eq!(values(&mut list), vec![1, 2]);
}

// -------------------- delete --------------------

#[test]
fn delete_shifts_tail_left_and_truncates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.idx");
    let mut list = filled(&path, &[1, 2, 3, 4]);

    list.delete(1).unwrap();
    assert_eq!(values(&mut list), vec![1, 3, 4]);
    assert_eq!(fs::metadata(&path).unwrap().len(), 12);

    list.delete(2).unwrap();
    assert_eq!(values(&mut list), vec![1, 3]);

    list.delete(0).unwrap();
    list.delete(0).unwrap();
    assert!(list.is_empty());
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
}

#[test]
fn delete_out_of_range() {
    let dir = tempdir().unwrap();
    let mut list = filled(&dir.path().join("a.idx"), &[1]);
    assert!(matches!(
        list.delete(1),
        Err(RecordListError::OutOfRange { .. })
    ));
}

#[test]
fn delete_spanning_several_chunks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("big.idx");
    let n = (SHIFT_CHUNK_BYTES / 4) as u32 * 2 + 17;
    let raw: Vec<u8> = (0..n).flat_map(|v| v.to_be_bytes()).collect();
    fs::write(&path, raw).unwrap();
    let mut list = RecordList::open(&path, 4).unwrap();

    list.delete(3).unwrap();

    let got = values(&mut list);
    assert_eq!(got.len(), n as usize - 1);
    assert_eq!(&got[..3], &[0, 1, 2]);
    assert_eq!(got[3], 4);
    assert_eq!(*got.last().unwrap(), n - 1);
}

// -------------------- insert_many --------------------

#[test]
fn insert_many_empty_batch_is_noop() {
    let dir = tempdir().unwrap();
    let mut list = filled(&dir.path().join("a.idx"), &[1, 2]);
    assert_eq!(list.insert_many(&[]).unwrap(), 0);
    assert_eq!(values(&mut list), vec![1, 2]);
}

#[test]
fn insert_many_interleaves() {
    let dir = tempdir().unwrap();
    let mut list = filled(&dir.path().join("a.idx"), &[10, 20, 30, 40]);

    let placed = list
        .insert_many(&[(0, rec(5)), (2, rec(25)), (2, rec(26)), (4, rec(45))])
        .unwrap();

    assert_eq!(placed, 4);
    assert_eq!(values(&mut list), vec![5, 10, 20, 25, 26, 30, 40, 45]);
    assert_eq!(list.len(), 8);
}

#[test]
fn insert_many_into_empty_list() {
    let dir = tempdir().unwrap();
    let mut list = RecordList::open(dir.path().join("a.idx"), 4).unwrap();
    list.insert_many(&[(0, rec(1)), (0, rec(2)), (0, rec(3))])
        .unwrap();
    assert_eq!(values(&mut list), vec![1, 2, 3]);
}

#[test]
fn insert_many_all_at_end_leaves_prefix() {
    let dir = tempdir().unwrap();
    let mut list = filled(&dir.path().join("a.idx"), &[1, 2, 3]);
    list.insert_many(&[(3, rec(4)), (3, rec(5))]).unwrap();
    assert_eq!(values(&mut list), vec![1, 2, 3, 4, 5]);
}

#[test]
fn insert_many_all_at_front() {
    let dir = tempdir().unwrap();
    let mut list = filled(&dir.path().join("a.idx"), &[7, 8, 9]);
    list.insert_many(&[(0, rec(1)), (0, rec(2)), (0, rec(3)), (0, rec(4))])
        .unwrap();
    assert_eq!(values(&mut list), vec![1, 2, 3, 4, 7, 8, 9]);
}

#[test]
fn insert_many_validates_before_writing() {
    let dir = tempdir().unwrap();
    let mut list = filled(&dir.path().join("a.idx"), &[1, 2, 3]);

    assert!(matches!(
        list.insert_many(&[(0, rec(0)), (4, rec(9))]),
        Err(RecordListError::OutOfRange { index: 4, len: 3 })
    ));
    assert!(matches!(
        list.insert_many(&[(2, rec(0)), (1, rec(9))]),
        Err(RecordListError::UnorderedPlacement {
            position: 1,
            previous: 2
        })
    ));
    assert!(matches!(
        list.insert_many(&[(0, rec(0)), (1, vec![1])]),
        Err(RecordListError::LengthMismatch { .. })
    ));

    assert_eq!(values(&mut list), vec![1, 2, 3]);
    assert_eq!(list.len(), 3);
}

#[test]
fn insert_many_matches_vec_model() {
    let dir = tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(0x5EED);

    for round in 0..40 {
        let n = rng.gen_range(0..60);
        let m = rng.gen_range(1..25);
        let original: Vec<u32> = (0..n).map(|i| i * 10).collect();

        let mut positions: Vec<usize> = (0..m).map(|_| rng.gen_range(0..=n as usize)).collect();
        positions.sort();
        let placements: Vec<(usize, Vec<u8>)> = positions
            .iter()
            .enumerate()
            .map(|(k, p)| (*p, rec(100_000 + k as u32)))
            .collect();

        let mut model = original.clone();
        for (k, (p, _)) in placements.iter().enumerate() {
            model.insert(p + k, 100_000 + k as u32);
        }

        let path = dir.path().join(format!("round-{}.idx", round));
        let mut list = filled(&path, &original);
        list.insert_many(&placements).unwrap();

        assert_eq!(values(&mut list), model, "round {}", round);
        assert_eq!(list.len(), model.len());
    }
}

// -------------------- Lifecycle --------------------

#[test]
fn close_then_reopen_preserves_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.idx");
    {
        let mut list = filled(&path, &[3, 1, 2]);
        list.sync().unwrap();
        list.close().unwrap();
    }
    let mut list = RecordList::open(&path, 4).unwrap();
    assert_eq!(values(&mut list), vec![3, 1, 2]);
}
