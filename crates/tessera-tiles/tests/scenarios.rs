//! Grid scenarios: history, blits and old-data reads through the façade.

use std::sync::Arc;

use tessera_core::Rect;
use tessera_test_utils::{check_hole, memory_is_filled, TestStore, TILE_SIZE};
use tessera_tiles::{Tile, TiledDataManager};

const DEFAULT: u8 = 0;
const ODD1: u8 = 128;
const ODD2: u8 = 129;
const ODD3: u8 = 130;
const ODD4: u8 = 131;

fn grid(store: &TestStore) -> TiledDataManager {
    TiledDataManager::new(store.handle(), &[DEFAULT]).unwrap()
}

fn tile_at(dm: &TiledDataManager, col: i32, row: i32, old: bool) -> Arc<Tile> {
    if old {
        dm.get_old_tile(col, row).0
    } else {
        dm.get_tile(col, row, false)
    }
}

/// Whether every tile in the inclusive column and row ranges holds the same
/// version in both grids.
fn tiles_shared(
    src: &TiledDataManager,
    src_old: bool,
    dst: &TiledDataManager,
    dst_old: bool,
    cols: std::ops::RangeInclusive<i32>,
    rows: std::ops::RangeInclusive<i32>,
) -> Vec<bool> {
    let mut out = Vec::new();
    for row in rows {
        for col in cols.clone() {
            let a = tile_at(src, col, row, src_old).tile_data();
            let b = tile_at(dst, col, row, dst_old).tile_data();
            out.push(Arc::ptr_eq(&a, &b));
        }
    }
    out
}

fn all_shared(v: Vec<bool>) -> bool {
    v.into_iter().all(|s| s)
}

fn none_shared(v: Vec<bool>) -> bool {
    v.into_iter().all(|s| !s)
}

fn filled(tile: &Tile, pixel: u8) -> bool {
    memory_is_filled(pixel, &tile.lock_for_read().unwrap()[..TILE_SIZE])
}

fn snapshot(dm: &TiledDataManager, rect: Rect) -> Vec<u8> {
    let mut buf = vec![0u8; rect.area()];
    dm.read_bytes(rect, &mut buf).unwrap();
    buf
}

#[test]
fn undoing_new_tiles_restores_empty_extent() {
    let store = TestStore::new();
    let dm = grid(&store);
    let _empty = dm.get_tile(0, 0, false);
    assert!(dm.extent().is_empty());

    let _m = dm.get_memento();
    let _created = dm.get_tile(0, 0, true);
    dm.commit();
    assert_eq!(dm.extent(), Rect::new(0, 0, 64, 64));

    dm.rollback().unwrap();
    assert!(dm.extent().is_empty());
}

#[test]
fn purged_and_empty_transactions_keep_visible_state() {
    let store = TestStore::new();
    let dm = grid(&store);
    let rect = Rect::new(0, 0, 512, 512);
    let clear1 = Rect::new(50, 50, 100, 100);
    let clear2 = Rect::new(150, 50, 100, 100);
    let both_holes = |buf: &[u8]| {
        (rect.top()..rect.bottom()).all(|y| {
            (rect.left()..rect.right()).all(|x| {
                let expected = if clear1.contains_point(x, y) || clear2.contains_point(x, y) {
                    ODD1
                } else {
                    DEFAULT
                };
                buf[(y * rect.width + x) as usize] == expected
            })
        })
    };

    let m0 = dm.get_memento();
    dm.clear(clear1, &[ODD1]).unwrap();
    dm.purge_history(&m0);
    assert!(!m0.is_valid());
    assert!(check_hole(&snapshot(&dm, rect), ODD1, clear1, DEFAULT, rect));

    let m1 = dm.get_memento();
    dm.clear(clear2, &[ODD1]).unwrap();
    assert!(both_holes(&snapshot(&dm, rect)));
    dm.purge_history(&m1);
    assert!(both_holes(&snapshot(&dm, rect)));

    let m2 = dm.get_memento();
    dm.commit();
    let undone = dm.rollback().unwrap().unwrap();
    assert!(Arc::ptr_eq(undone.memento.as_ref().unwrap(), &m2));
    assert!(undone.touched.is_empty());
    assert!(both_holes(&snapshot(&dm, rect)));

    let _m3 = dm.get_memento();
    dm.set_extent(clear2).unwrap();
    dm.commit();
    assert!(check_hole(&snapshot(&dm, rect), ODD1, clear2, DEFAULT, rect));

    dm.rollback().unwrap();
    assert!(both_holes(&snapshot(&dm, rect)));
}

#[test]
fn unversioned_bit_blt_shares_whole_tiles() {
    let store = TestStore::new();
    let src = grid(&store);
    let dst = grid(&store);
    let rect = Rect::new(0, 0, 512, 512);
    let clone_rect = Rect::new(81, 80, 250, 250);

    src.clear(rect, &[ODD1]).unwrap();
    dst.clear(rect, &[ODD2]).unwrap();
    dst.bit_blt(&src, clone_rect).unwrap();

    assert!(check_hole(&snapshot(&dst, rect), ODD1, clone_rect, ODD2, rect));
    assert!(all_shared(tiles_shared(&src, false, &dst, false, 2..=4, 2..=4)));
}

#[test]
fn versioned_bit_blt_follows_history() {
    let store = TestStore::new();
    let src1 = grid(&store);
    let src2 = grid(&store);
    let dst = grid(&store);
    let rect = Rect::new(0, 0, 512, 512);
    let clone_rect = Rect::new(81, 80, 250, 250);
    let (cols, rows) = (2..=4, 2..=4);

    let _m1 = src1.get_memento();
    src1.clear(rect, &[ODD1]).unwrap();
    src2.clear(rect, &[ODD2]).unwrap();
    dst.clear(rect, &[ODD3]).unwrap();

    let _m2 = dst.get_memento();
    dst.bit_blt(&src1, clone_rect).unwrap();
    assert!(all_shared(tiles_shared(&src1, false, &dst, false, cols.clone(), rows.clone())));
    assert!(none_shared(tiles_shared(&src1, true, &src1, false, cols.clone(), rows.clone())));
    assert!(none_shared(tiles_shared(&dst, true, &dst, false, cols.clone(), rows.clone())));

    dst.commit();
    assert!(all_shared(tiles_shared(&dst, true, &dst, false, cols.clone(), rows.clone())));

    let _m3 = src2.get_memento();
    src2.clear(rect, &[ODD4]).unwrap();

    let _m4 = dst.get_memento();
    dst.bit_blt(&src2, clone_rect).unwrap();
    assert!(all_shared(tiles_shared(&src2, false, &dst, false, cols.clone(), rows.clone())));
    assert!(none_shared(tiles_shared(&src2, true, &src2, false, cols.clone(), rows.clone())));
    assert!(none_shared(tiles_shared(&dst, true, &dst, false, cols.clone(), rows.clone())));

    dst.commit();
    assert!(all_shared(tiles_shared(&dst, true, &dst, false, cols.clone(), rows.clone())));

    dst.rollback().unwrap();
    assert!(all_shared(tiles_shared(&src1, false, &dst, false, cols.clone(), rows.clone())));
    assert!(all_shared(tiles_shared(&dst, true, &dst, false, cols.clone(), rows.clone())));
    assert!(none_shared(tiles_shared(&src1, true, &src1, false, cols.clone(), rows.clone())));

    dst.rollforward().unwrap();
    assert!(all_shared(tiles_shared(&src2, false, &dst, false, cols.clone(), rows.clone())));
    assert!(all_shared(tiles_shared(&dst, true, &dst, false, cols.clone(), rows.clone())));
    assert!(none_shared(tiles_shared(&src1, true, &src1, false, cols, rows)));
}

#[test]
fn bit_blt_old_data_reads_committed_state() {
    let store = TestStore::new();
    let src = grid(&store);
    let dst = grid(&store);
    let rect = Rect::new(0, 0, 512, 512);
    let clone_rect = Rect::new(81, 80, 250, 250);

    let _m1 = src.get_memento();
    src.clear(rect, &[ODD1]).unwrap();
    src.commit();

    dst.bit_blt_old_data(&src, clone_rect).unwrap();
    assert!(check_hole(&snapshot(&dst, rect), ODD1, clone_rect, DEFAULT, rect));

    let _m2 = src.get_memento();
    src.clear(rect, &[ODD2]).unwrap();
    dst.bit_blt_old_data(&src, clone_rect).unwrap();
    src.commit();
    assert!(check_hole(&snapshot(&dst, rect), ODD1, clone_rect, DEFAULT, rect));
}

#[test]
fn rough_bit_blt_covers_whole_tiles() {
    let store = TestStore::new();
    let src = grid(&store);
    let dst = grid(&store);
    let rect = Rect::new(0, 0, 512, 512);
    let clone_rect = Rect::new(81, 80, 250, 250);
    let actual = Rect::new(64, 64, 320, 320);

    src.clear(rect, &[ODD1]).unwrap();
    dst.clear(rect, &[ODD2]).unwrap();
    dst.bit_blt_rough(&src, clone_rect).unwrap();
    assert!(check_hole(&snapshot(&dst, rect), ODD1, actual, ODD2, rect));
    assert!(all_shared(tiles_shared(&src, false, &dst, false, 1..=4, 1..=4)));

    let _m1 = src.get_memento();
    src.clear(rect, &[ODD3]).unwrap();
    dst.bit_blt_rough_old_data(&src, clone_rect).unwrap();
    src.commit();
    assert!(check_hole(&snapshot(&dst, rect), ODD1, actual, ODD2, rect));
}

#[test]
fn blit_with_different_defaults_materializes_empty_tiles() {
    let store = TestStore::new();
    let src = grid(&store);
    let dst = TiledDataManager::new(store.handle(), &[9]).unwrap();
    dst.bit_blt_rough(&src, Rect::new(0, 0, 64, 64)).unwrap();
    assert!(dst.tile_exists(0, 0));
    assert!(filled(&dst.get_tile(0, 0, false), DEFAULT));

    let same = grid(&store);
    same.clear(Rect::new(0, 0, 64, 64), &[ODD1]).unwrap();
    same.bit_blt_rough(&src, Rect::new(0, 0, 64, 64)).unwrap();
    assert!(!same.tile_exists(0, 0));
    assert!(same.extent().is_empty());
}

#[test]
fn anonymous_and_named_transactions_for_old_tiles() {
    let store = TestStore::new();
    let dm = grid(&store);
    let tile = Rect::new(0, 0, 64, 64);

    let _m1 = dm.get_memento();
    dm.clear(tile, &[ODD1]).unwrap();
    assert!(filled(&dm.get_tile(0, 0, false), ODD1));
    let (old, exists) = dm.get_old_tile(0, 0);
    assert!(filled(&old, DEFAULT));
    assert!(!exists);

    dm.commit();
    assert!(filled(&dm.get_tile(0, 0, false), ODD1));
    assert!(filled(&dm.get_old_tile(0, 0).0, ODD1));

    dm.clear(tile, &[ODD2]).unwrap();
    assert!(filled(&dm.get_tile(0, 0, false), ODD2));
    assert!(filled(&dm.get_old_tile(0, 0).0, ODD2));

    let _m2 = dm.get_memento();
    dm.clear(tile, &[ODD3]).unwrap();
    assert!(filled(&dm.get_tile(0, 0, false), ODD3));
    let (old, exists) = dm.get_old_tile(0, 0);
    assert!(filled(&old, ODD2));
    assert!(exists);
}

#[test]
fn purge_history_keeps_visible_state() {
    let store = TestStore::new();
    let dm = grid(&store);
    let tile = Rect::new(0, 0, 64, 64);

    let m1 = dm.get_memento();
    dm.clear(tile, &[ODD1]).unwrap();
    dm.commit();

    let m2 = dm.get_memento();
    dm.clear(tile, &[ODD2]).unwrap();
    assert!(filled(&dm.get_tile(0, 0, false), ODD2));
    assert!(filled(&dm.get_old_tile(0, 0).0, ODD1));

    dm.purge_history(&m1);
    assert!(filled(&dm.get_tile(0, 0, false), ODD2));
    assert!(filled(&dm.get_old_tile(0, 0).0, ODD1));

    dm.commit();
    dm.purge_history(&m2);
    assert_eq!(dm.memento_manager().revision_count(), 0);
    assert!(filled(&dm.get_tile(0, 0, false), ODD2));
    assert!(filled(&dm.get_old_tile(0, 0).0, ODD2));

    let m3 = dm.get_memento();
    dm.clear(tile, &[ODD3]).unwrap();
    dm.commit();
    let m4 = dm.get_memento();
    dm.clear(tile, &[ODD4]).unwrap();
    dm.commit();
    dm.rollback().unwrap();

    dm.purge_history(&m3);
    dm.purge_history(&m4);
    dm.purge_history(&m4);
    assert!(filled(&dm.get_tile(0, 0, false), ODD3));
    assert!(m4.is_valid());
    assert!(!m3.is_valid());
}

#[test]
fn undo_set_default_pixel() {
    let store = TestStore::new();
    let dm = grid(&store);
    let tile = Rect::new(0, 0, 64, 64);
    let check = |p00: u8, p10: u8| {
        assert!(filled(&dm.get_tile(0, 0, false), p00));
        assert!(filled(&dm.get_tile(1, 0, false), p10));
    };

    check(DEFAULT, DEFAULT);

    let _m1 = dm.get_memento();
    dm.clear(tile, &[ODD1]).unwrap();
    dm.commit();
    check(ODD1, DEFAULT);

    let _m2 = dm.get_memento();
    dm.set_default_pixel(&[ODD2]).unwrap();
    dm.commit();
    check(ODD1, ODD2);

    dm.rollback().unwrap();
    check(ODD1, DEFAULT);

    dm.rollback().unwrap();
    check(DEFAULT, DEFAULT);

    dm.rollforward().unwrap();
    check(ODD1, DEFAULT);

    dm.rollforward().unwrap();
    check(ODD1, ODD2);
}

#[test]
fn edits_after_undo_discard_redo() {
    let store = TestStore::new();
    let dm = grid(&store);
    let _m1 = dm.get_memento();
    dm.clear(Rect::new(0, 0, 64, 64), &[ODD1]).unwrap();
    dm.commit();
    dm.rollback().unwrap().unwrap();
    dm.set_pixel(200, 200, &[ODD2]).unwrap();
    assert!(dm.rollforward().unwrap().is_none());
    assert_eq!(dm.memento_manager().cancelled_count(), 0);
    assert!(filled(&dm.get_tile(0, 0, false), DEFAULT));
}
