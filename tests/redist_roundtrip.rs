//! Redistribution preserves global content whatever route it takes.
//!
//! A source filled from a formula of its global indices is pushed into
//! every placement and back again; afterwards every locally stored entry
//! must still match the formula, whichever ranks it visited in between.
//! This exercises the direct algorithms and the routed fallback alike.

use std::sync::Arc;

use gridmat::parallel::local_comm::spawn_world;
use gridmat::{Comm, DistMatrix, DistPair, GmError, Grid, GridOrder, LocalComm};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn grid_2x3(comm: LocalComm) -> Arc<Grid<LocalComm>> {
    Arc::new(Grid::new(comm, 2, 3, GridOrder::ColumnMajor).unwrap())
}

fn value(i: usize, j: usize) -> f64 {
    (10 * i + j) as f64
}

/// Every locally stored entry agrees with the fill formula.
fn assert_matches(m: &DistMatrix<f64, LocalComm>) {
    for lj in 0..m.local_width() {
        for li in 0..m.local_height() {
            let (i, j) = (m.global_row(li), m.global_col(lj));
            assert_eq!(*m.local().get(li, lj), value(i, j), "entry ({i},{j})");
        }
    }
}

/// `[MC,MR]` into each of the fourteen placements and back. The
/// destination starts with the wrong shape on purpose; assignment adopts
/// the source's.
#[test]
fn every_pair_round_trips() {
    for pair in DistPair::ALL {
        spawn_world(6, move |comm| {
            let grid = grid_2x3(comm);
            let mut src = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 7, 5);
            src.fill_with(value).unwrap();

            let mut mid = DistMatrix::<f64, _>::with_shape(grid.clone(), pair, 1, 1);
            mid.redistribute_from(&src).unwrap();
            assert_eq!((mid.height(), mid.width()), (7, 5), "{pair}");
            assert_matches(&mid);

            let mut back = DistMatrix::<f64, _>::with_shape(grid, DistPair::MC_MR, 7, 5);
            back.redistribute_from(&mid).unwrap();
            assert_matches(&back);
        });
    }
}

/// Shapes smaller than the strides leave some ranks empty; they must
/// still take part in every collective and come back intact.
#[test]
fn small_and_empty_shapes_survive() {
    for pair in DistPair::ALL {
        spawn_world(6, move |comm| {
            let grid = grid_2x3(comm);
            let mut tiny = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 2, 1);
            tiny.fill_with(value).unwrap();
            let mut mid = DistMatrix::<f64, _>::with_shape(grid.clone(), pair, 1, 1);
            mid.redistribute_from(&tiny).unwrap();
            assert_matches(&mid);
            let mut back = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 2, 1);
            back.redistribute_from(&mid).unwrap();
            assert_matches(&back);

            let empty = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 0, 3);
            let mut out = DistMatrix::<f64, _>::with_shape(grid, pair, 2, 2);
            out.redistribute_from(&empty).unwrap();
            assert_eq!((out.height(), out.width()), (0, 3));
            assert_eq!(out.local_height(), 0);
        });
    }
}

/// Replicating onto `[*,*]` leaves the full matrix on every rank.
#[test]
fn replication_reaches_every_rank() {
    spawn_world(6, |comm| {
        let grid = grid_2x3(comm);
        let mut src = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 7, 5);
        src.fill_with(value).unwrap();
        let mut all = DistMatrix::<f64, _>::with_shape(grid, DistPair::STAR_STAR, 1, 1);
        all.redistribute_from(&src).unwrap();
        assert_eq!((all.local_height(), all.local_width()), (7, 5));
        assert_matches(&all);
    });
}

/// Same scheme, different alignments: dispatch translates, and the named
/// entry point carries it back to the default alignment.
#[test]
fn alignment_moves_translate() {
    spawn_world(6, |comm| {
        let grid = grid_2x3(comm);
        let mut src = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 7, 5);
        src.fill_with(value).unwrap();

        let mut moved = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 7, 5);
        moved.align(1, 2).unwrap();
        moved.redistribute_from(&src).unwrap();
        assert_matches(&moved);

        let mut back = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 1, 1);
        gridmat::translate(&moved, &mut back).unwrap();
        assert_matches(&back);

        // The vector analogue: one paired message per rank.
        let mut v = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::VC_STAR, 7, 5);
        v.redistribute_from(&src).unwrap();
        let mut w = DistMatrix::<f64, _>::with_shape(grid, DistPair::VC_STAR, 7, 5);
        w.align_cols(4).unwrap();
        w.redistribute_from(&v).unwrap();
        assert_matches(&w);
    });
}

/// Moving a diagonal placement onto another path re-homes every position.
#[test]
fn diagonal_path_moves_translate() {
    spawn_world(4, |comm| {
        let grid = Arc::new(Grid::new(comm, 2, 2, GridOrder::ColumnMajor).unwrap());
        let mut src = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 6, 3);
        src.fill_with(value).unwrap();

        let mut d0 = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MD_STAR, 1, 1);
        d0.redistribute_from(&src).unwrap();
        assert_matches(&d0);
        let on_path0 = grid.diag_path(grid.row(), grid.col()) == 0;
        assert_eq!(d0.participating(), on_path0);

        let mut d1 = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MD_STAR, 6, 3);
        d1.set_root(1).unwrap();
        d1.redistribute_from(&d0).unwrap();
        assert_eq!(d1.participating(), !on_path0);
        assert_matches(&d1);

        let mut back = DistMatrix::<f64, _>::with_shape(grid, DistPair::MC_MR, 6, 3);
        back.redistribute_from(&d1).unwrap();
        assert_matches(&back);
    });
}

/// A diagonal extracted in place rides the engine like any `[Md, o]`
/// matrix: replicating it hands every rank the whole diagonal.
#[test]
fn extracted_diagonals_replicate() {
    spawn_world(4, |comm| {
        let grid = Arc::new(Grid::new(comm, 2, 2, GridOrder::ColumnMajor).unwrap());
        let mut src = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 6, 3);
        src.fill_with(value).unwrap();

        for offset in [-2, 0, 2] {
            let d = src.get_diagonal(offset).unwrap();
            let mut all =
                DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::STAR_STAR, 1, 1);
            all.redistribute_from(&d).unwrap();
            assert_eq!(all.height(), src.diagonal_length(offset));
            let (i0, j0) = (offset.min(0).unsigned_abs(), offset.max(0) as usize);
            for k in 0..all.height() {
                assert_eq!(*all.local().get(k, 0), value(i0 + k, j0 + k), "offset {offset}");
            }
        }
    });
}

/// Swapping the two vector orderings, through dispatch and through the
/// named entry point.
#[test]
fn vector_orderings_exchange() {
    spawn_world(6, |comm| {
        let grid = grid_2x3(comm);
        let mut src = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 7, 5);
        src.fill_with(value).unwrap();

        let mut vc = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::VC_STAR, 7, 5);
        vc.redistribute_from(&src).unwrap();
        let mut vr = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::VR_STAR, 7, 5);
        vr.redistribute_from(&vc).unwrap();
        assert_matches(&vr);

        let mut vc2 = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::VC_STAR, 7, 5);
        gridmat::exchange(&vr, &mut vc2).unwrap();
        assert_matches(&vc2);

        // Row-axis variant, with an alignment in play.
        let mut rv = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::STAR_VC, 7, 5);
        rv.align_rows(2).unwrap();
        rv.redistribute_from(&src).unwrap();
        assert_matches(&rv);
        let mut rw = DistMatrix::<f64, _>::with_shape(grid, DistPair::STAR_VR, 7, 5);
        gridmat::exchange(&rv, &mut rw).unwrap();
        assert_matches(&rw);
    });
}

/// On a one-rank grid every redistribution is a local copy; none of the
/// grid's communicators may see a collective.
#[test]
fn single_rank_grid_moves_nothing() {
    spawn_world(1, |comm| {
        let grid = Arc::new(Grid::new(comm, 1, 1, GridOrder::ColumnMajor).unwrap());
        let ops = |g: &Grid<LocalComm>| {
            g.comm().collective_ops()
                + g.col_comm().collective_ops()
                + g.row_comm().collective_ops()
                + g.vc_comm().collective_ops()
                + g.vr_comm().collective_ops()
                + g.diag_comm().collective_ops()
        };
        let mut src = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 5, 4);
        src.fill_with(value).unwrap();
        let before = ops(&grid);
        for pair in DistPair::ALL {
            let mut dst = DistMatrix::<f64, _>::with_shape(grid.clone(), pair, 5, 4);
            dst.redistribute_from(&src).unwrap();
            assert_matches(&dst);
        }
        assert_eq!(ops(&grid), before);
    });
}

/// Random content survives a chain of hops exactly; every rank derives
/// the same table from a shared seed, so replicas can be checked without
/// any extra communication.
#[test]
fn random_content_survives_a_chain() {
    spawn_world(6, |comm| {
        let mut rng = StdRng::seed_from_u64(7);
        let table: Vec<f64> = (0..63).map(|_| rng.r#gen()).collect();
        let at = |i: usize, j: usize| table[i + 9 * j];

        let grid = grid_2x3(comm);
        let mut src = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 9, 7);
        src.fill_with(&at).unwrap();

        let mut v = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::VC_STAR, 9, 7);
        v.redistribute_from(&src).unwrap();
        let mut t = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MR_MC, 9, 7);
        t.redistribute_from(&v).unwrap();
        let mut back = DistMatrix::<f64, _>::with_shape(grid, DistPair::MC_MR, 9, 7);
        back.redistribute_from(&t).unwrap();

        for lj in 0..back.local_width() {
            for li in 0..back.local_height() {
                let (i, j) = (back.global_row(li), back.global_col(lj));
                assert_eq!(*back.local().get(li, lj), at(i, j), "entry ({i},{j})");
            }
        }
    });
}

/// Matrices on two different grids never mix, even when the grids have
/// the same shape and ranks.
#[test]
fn distinct_grids_refuse_to_mix() {
    spawn_world(6, |comm| {
        let twin = comm.split(0, comm.rank());
        let ga = grid_2x3(comm);
        let gb = Arc::new(Grid::new(twin, 2, 3, GridOrder::ColumnMajor).unwrap());
        let src = DistMatrix::<f64, _>::with_shape(ga, DistPair::MC_MR, 4, 4);
        let mut dst = DistMatrix::<f64, _>::with_shape(gb, DistPair::MC_MR, 4, 4);
        let err = dst.redistribute_from(&src).unwrap_err();
        assert!(matches!(err, GmError::Configuration(_)));
    });
}
