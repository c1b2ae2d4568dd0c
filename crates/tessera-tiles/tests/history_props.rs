//! Property tests for undo history and copy-on-write sharing.

use proptest::prelude::*;
use tessera_core::Rect;
use tessera_test_utils::TestStore;
use tessera_tiles::TiledDataManager;

const AREA: Rect = Rect {
    x: -64,
    y: -64,
    width: 320,
    height: 256,
};

fn arb_rect() -> impl Strategy<Value = Rect> {
    (-64i32..200, -64i32..150, 1i32..160, 1i32..140)
        .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h).intersected(&AREA))
        .prop_filter("inside the sampled area", |r| !r.is_empty())
}

#[derive(Clone, Debug)]
enum Edit {
    Clear(Rect, u8),
    Write(Rect, u8),
    Default(u8),
}

fn arb_edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (arb_rect(), any::<u8>()).prop_map(|(r, p)| Edit::Clear(r, p)),
        3 => (arb_rect(), any::<u8>()).prop_map(|(r, p)| Edit::Write(r, p)),
        1 => any::<u8>().prop_map(Edit::Default),
    ]
}

fn apply(dm: &TiledDataManager, edit: &Edit) {
    match *edit {
        Edit::Clear(rect, pixel) => dm.clear(rect, &[pixel]).unwrap(),
        Edit::Write(rect, seed) => {
            let data: Vec<u8> = (0..rect.area()).map(|i| seed.wrapping_add(i as u8)).collect();
            dm.write_bytes(rect, &data).unwrap();
        }
        Edit::Default(pixel) => dm.set_default_pixel(&[pixel]).unwrap(),
    }
}

fn snapshot(dm: &TiledDataManager) -> Vec<u8> {
    let mut buf = vec![0u8; AREA.area()];
    dm.read_bytes(AREA, &mut buf).unwrap();
    buf
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn undo_and_redo_replay_committed_states(
        edits in proptest::collection::vec(proptest::collection::vec(arb_edit(), 1..4), 1..6),
    ) {
        let store = TestStore::new();
        let dm = TiledDataManager::new(store.handle(), &[0]).unwrap();
        let mut states = vec![snapshot(&dm)];
        for transaction in &edits {
            let _m = dm.get_memento();
            for edit in transaction {
                apply(&dm, edit);
            }
            dm.commit();
            states.push(snapshot(&dm));
        }

        for expected in states.iter().rev().skip(1) {
            prop_assert!(dm.rollback().unwrap().is_some());
            prop_assert_eq!(&snapshot(&dm), expected);
        }
        prop_assert!(dm.rollback().unwrap().is_none());
        prop_assert!(dm.extent().is_empty());

        for expected in states.iter().skip(1) {
            prop_assert!(dm.rollforward().unwrap().is_some());
            prop_assert_eq!(&snapshot(&dm), expected);
        }
        prop_assert!(dm.rollforward().unwrap().is_none());
    }

    #[test]
    fn purging_history_keeps_later_revisions_intact(
        edits in proptest::collection::vec(arb_edit(), 2..8),
        cut in 0usize..8,
    ) {
        let store = TestStore::new();
        let dm = TiledDataManager::new(store.handle(), &[0]).unwrap();
        let mut mementos = Vec::new();
        let mut states = vec![snapshot(&dm)];
        for edit in &edits {
            mementos.push(dm.get_memento());
            apply(&dm, edit);
            dm.commit();
            states.push(snapshot(&dm));
        }
        let len = mementos.len();
        let cut = cut.min(len - 1);

        dm.purge_history(&mementos[cut]);
        prop_assert_eq!(&snapshot(&dm), &states[len]);
        prop_assert_eq!(dm.memento_manager().revision_count(), len - cut - 1);
        dm.purge_history(&mementos[cut]);
        prop_assert_eq!(dm.memento_manager().revision_count(), len - cut - 1);
        for m in &mementos[..=cut] {
            prop_assert!(!m.is_valid());
        }
        for m in &mementos[cut + 1..] {
            prop_assert!(m.is_valid());
        }

        // Revision k took states[k] to states[k + 1].
        for k in (cut + 1..len).rev() {
            prop_assert!(dm.rollback().unwrap().is_some());
            prop_assert_eq!(&snapshot(&dm), &states[k]);
        }
        prop_assert!(dm.rollback().unwrap().is_none());
        prop_assert_eq!(&snapshot(&dm), &states[cut + 1]);

        for k in cut + 1..len {
            prop_assert!(dm.rollforward().unwrap().is_some());
            prop_assert_eq!(&snapshot(&dm), &states[k + 1]);
        }
        prop_assert!(dm.rollforward().unwrap().is_none());
        prop_assert_eq!(&snapshot(&dm), &states[len]);
    }

    #[test]
    fn writes_never_leak_into_shared_copies(
        setup in arb_edit(),
        later in proptest::collection::vec(arb_edit(), 1..5),
    ) {
        let store = TestStore::new();
        let src = TiledDataManager::new(store.handle(), &[0]).unwrap();
        let dst = TiledDataManager::new(store.handle(), &[0]).unwrap();
        apply(&src, &setup);
        dst.bit_blt(&src, AREA).unwrap();
        let shared = snapshot(&dst);
        prop_assert_eq!(&shared, &snapshot(&src));

        let duplicate = src.duplicate();
        for edit in &later {
            apply(&src, edit);
        }
        prop_assert_eq!(&snapshot(&dst), &shared);
        prop_assert_eq!(&snapshot(&duplicate), &shared);
    }
}
