use std::sync::Arc;

use gridmat::parallel::local_comm::spawn_world;
use gridmat::{Comm, DistMatrix, DistPair, Grid, GridOrder};

fn main() {
    env_logger::init();

    let reports = spawn_world(6, |comm| {
        let rank = comm.rank();
        let grid = Arc::new(Grid::new(comm, 2, 3, GridOrder::ColumnMajor).unwrap());

        // spread a 7x5 matrix over the 2x3 grid
        let mut spread = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 7, 5);
        spread.fill_with(|i, j| (10 * i + j) as f64).unwrap();
        let held = spread.local().height() * spread.local().width();

        // all-gather it so every rank holds the full matrix
        let mut all = DistMatrix::<f64, _>::with_shape(grid, DistPair::STAR_STAR, 1, 1);
        all.redistribute_from(&spread).unwrap();
        let mut intact = true;
        for j in 0..all.width() {
            for i in 0..all.height() {
                intact &= *all.local().get(i, j) == (10 * i + j) as f64;
            }
        }
        (rank, held, intact)
    });

    for (rank, held, intact) in reports {
        println!("rank {rank}: held {held} of 35 entries, full replica intact = {intact}");
    }
}
