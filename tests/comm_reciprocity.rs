//! Cross-process consistency of the send/receive predicates, checked with
//! independent scheduler instances built from each process's own grid view.

use itertools::iproduct;
use kba_sweep::prelude::*;

fn schedulers(nx: i32, ny: i32, nblock_z: i32, blocks: i32) -> Vec<(ProcGrid, StepScheduler)> {
    (0..(nx * ny) as usize)
        .map(|rank| {
            let grid = ProcGrid::from_rank(nx, ny, rank).unwrap();
            let sched = StepScheduler::new(nblock_z, blocks, &grid).unwrap();
            (grid, sched)
        })
        .collect()
}

#[test]
fn independently_built_schedulers_agree() {
    let all = schedulers(3, 2, 2, 4);
    let (_, reference) = all[0];
    for (_, sched) in &all {
        assert_eq!(*sched, reference);
    }
}

#[test]
fn every_send_is_matched_by_the_neighbors_receive() {
    for (nx, ny, blocks) in iproduct!([1, 2, 3], [1, 2], [1, 2, 4, 8]) {
        let all = schedulers(nx, ny, 2, blocks);
        for (grid, sched) in &all {
            for step in 0..sched.nstep() {
                for (axis, dir, oib) in
                    iproduct!(Axis::ALL, [Dir::Up, Dir::Dn], 0..sched.noctant_per_block())
                {
                    if !sched.must_send(step, axis, dir, oib, grid) {
                        continue;
                    }
                    let (x, y) = grid.neighbor(axis, dir);
                    let peer = grid.rank_at(x, y).expect("send targets an in-grid peer");
                    let (peer_grid, peer_sched) = &all[peer];
                    assert!(
                        peer_sched.must_recv(step, axis, dir, oib, peer_grid),
                        "unmatched send at step {step} {axis:?} {dir:?} oib {oib} \
                         from rank {} on {nx}x{ny} blocks={blocks}",
                        grid.rank()
                    );
                }
            }
        }
    }
}

#[test]
fn every_receive_is_matched_by_the_neighbors_send() {
    for (nx, ny, blocks) in iproduct!([2, 3], [1, 2], [1, 8]) {
        let all = schedulers(nx, ny, 3, blocks);
        for (grid, sched) in &all {
            for step in 0..sched.nstep() {
                for op in sched.face_exchanges(step, grid).collect::<Vec<_>>() {
                    if op.kind != CommKind::Recv {
                        continue;
                    }
                    let (x, y) = grid.neighbor(op.axis, op.dir.opposite());
                    let peer = grid.rank_at(x, y).expect("recv names an in-grid peer");
                    let (peer_grid, peer_sched) = &all[peer];
                    assert!(peer_sched.must_send(step, op.axis, op.dir, op.octant_in_block, peer_grid));
                }
            }
        }
    }
}

#[test]
fn total_sends_equal_total_receives_each_step() {
    let all = schedulers(3, 3, 2, 8);
    let nstep = all[0].1.nstep();
    for step in 0..nstep {
        let mut sends = 0usize;
        let mut recvs = 0usize;
        for (grid, sched) in &all {
            for op in sched.face_exchanges(step, grid) {
                match op.kind {
                    CommKind::Send => sends += 1,
                    CommKind::Recv => recvs += 1,
                }
            }
        }
        assert_eq!(sends, recvs, "step {step}");
    }
}
