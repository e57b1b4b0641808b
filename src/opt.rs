//! Peephole passes over the lowered step list.
//!
//! The passes run in a fixed order. Memory-read setups are hoisted
//! first, while the padding emitted by the lowerer is still in place.
//! Useful work then trickles toward lower indices, and finally adjacent
//! no-op pairs are deleted. Deleting in pairs keeps every memory access
//! on an odd index.

use masks;
use program::DspProgram;

/// Hoist memory-read setups onto earlier steps.
///
/// A lowered read occupies three steps: the setup at an odd index, a
/// no-op, and the MEMS write two steps after the setup. The setup can
/// run earlier as long as it stays on an odd index, does not clash with
/// a memory write, and does not pass either an existing MEMS write or a
/// step that reads INPUTS from the register being loaded. The MEMS
/// write moves along with it, keeping the two-step read latency.
pub fn opt_loads(program: &mut DspProgram) {
    for i in 3..program.steps.len() {
        let step = program.steps[i];
        if step & masks::MRD.mask == 0 || step & masks::IWT.mask != 0 {
            continue;
        }
        if i + 2 >= program.steps.len() {
            continue;
        }
        let target = masks::IWA.get(program.steps[i + 2]);

        let mut candidate = i;
        let mut j = i - 1;
        while j >= 2 {
            let other = program.steps[j];
            if other & masks::IWT.mask != 0 {
                break;
            }
            if other & (masks::ADRL.mask | masks::YRL.mask | masks::XSEL.mask) != 0
                && masks::IRA.get(other) == target
            {
                break;
            }
            candidate = j;
            j -= 1;
        }

        let mut candidate = candidate | 1;
        while candidate < i && program.steps[candidate] & masks::MWT.mask != 0 {
            candidate += 2;
        }
        if candidate >= i {
            continue;
        }

        let setup = program.steps[i] & masks::LOAD_SETUP;
        program.steps[candidate] |= setup;
        program.steps[i] &= !masks::LOAD_SETUP;
        let write = program.steps[i + 2] & masks::MEMS_WRITE;
        program.steps[candidate + 2] |= write;
        program.steps[i + 2] &= !masks::MEMS_WRITE;
    }
}

/// Bubble useful work toward lower indices.
///
/// Sweeps from high to low indices, swapping any movable step with an
/// immediately preceding bare no-op, and repeats until a full sweep
/// changes nothing. Memory-access steps never move, so they keep their
/// alignment and their ordering relative to everything they cannot
/// cross.
pub fn trickle_down(program: &mut DspProgram) {
    let mut moved = true;
    while moved {
        moved = false;
        for i in (1..program.steps.len()).rev() {
            let step = program.steps[i];
            if step == masks::DUMMY_ACC
                || step & (masks::MEM_ACCESS | masks::IWT.mask) != 0
            {
                continue;
            }
            if program.steps[i - 1] == masks::DUMMY_ACC && program.coefs[i - 1] == 0 {
                program.steps.swap(i - 1, i);
                program.coefs.swap(i - 1, i);
                moved = true;
            }
        }
    }
}

/// Delete pairs of adjacent no-ops.
///
/// Only steps that are exactly the dummy-acc word with no attached
/// coefficient count as no-ops. Single no-ops are kept; removing an odd
/// number would flip the alignment of every following memory access.
pub fn drop_nops(program: &mut DspProgram) {
    let mut was_nop = false;
    let mut i = program.steps.len();
    while i > 0 {
        i -= 1;
        let nop = program.steps[i] == masks::DUMMY_ACC && program.coefs[i] == 0;
        if nop && was_nop {
            program.steps.drain(i..i + 2);
            program.coefs.drain(i..i + 2);
            was_nop = false;
        } else {
            was_nop = nop;
        }
    }
}

/// Run all passes in their mandatory order.
pub fn optimize(program: &mut DspProgram) {
    opt_loads(program);
    trickle_down(program);
    drop_nops(program);
}

#[cfg(test)]
mod tests {
    use super::*;
    use compile::compile;
    use masks::*;

    fn compiled(source: &str) -> DspProgram {
        compile(source.as_bytes()).unwrap()
    }

    fn nop_at(program: &DspProgram, i: usize) -> bool {
        program.steps[i] == DUMMY_ACC && program.coefs[i] == 0
    }

    #[test]
    fn read_setup_hoists_and_write_follows() {
        let mut program = compiled(
            "INPUT mems:0\nOUTPUT yreg\nOUTPUT yreg\nOUTPUT yreg\nOUTPUT yreg\n\
             LD madrs:1, mems:2\n",
        );
        assert_eq!(program.steps.len(), 8);
        assert!(program.steps[5] & MRD.mask != 0);

        opt_loads(&mut program);
        assert!(program.steps[3] & MRD.mask != 0);
        assert_eq!(MASA.get(program.steps[3]), 1);
        assert!(program.steps[3] & NOFL.mask != 0);
        assert!(program.steps[5] & MRD.mask == 0);
        assert!(program.steps[5] & IWT.mask != 0);
        assert_eq!(IWA.get(program.steps[5]), 2);
        assert!(program.steps[7] & IWT.mask == 0);

        drop_nops(&mut program);
        assert_eq!(program.steps.len(), 6);
    }

    #[test]
    fn hoist_stops_behind_reader_of_target_mems() {
        let mut program = compiled(
            "INPUT mems:2\nOUTPUT yreg\nOUTPUT yreg\nOUTPUT yreg\nLD madrs:1, mems:2\n",
        );
        let before = program.clone();
        opt_loads(&mut program);
        assert_eq!(program, before);
    }

    #[test]
    fn hoist_skips_over_memory_writes() {
        let mut program = compiled(
            "INPUT mems:9\nOUTPUT yreg\nOUTPUT yreg\nOUTPUT yreg\nST madrs:0\n\
             OUTPUT yreg\nOUTPUT yreg\nLD madrs:1, mems:0\n",
        );
        assert!(program.steps[3] & MWT.mask != 0);
        assert!(program.steps[7] & MRD.mask != 0);

        opt_loads(&mut program);
        assert!(program.steps[5] & MRD.mask != 0);
        assert!(program.steps[7] & MRD.mask == 0);
        assert!(program.steps[7] & IWT.mask != 0);
    }

    #[test]
    fn hoist_stops_behind_existing_mems_write() {
        let mut program = compiled(
            "INPUT mems:9\nOUTPUT yreg\nLD madrs:0, mems:0\nOUTPUT yreg\n\
             OUTPUT yreg\nLD madrs:1, mems:1\n",
        );
        opt_loads(&mut program);
        // the second read may not pass the first read's MEMS write
        let first_write = program
            .steps
            .iter()
            .position(|&step| step & IWT.mask != 0)
            .unwrap();
        let second_setup = program
            .steps
            .iter()
            .enumerate()
            .filter(|&(_, &step)| step & MRD.mask != 0)
            .map(|(i, _)| i)
            .nth(1)
            .unwrap();
        assert!(second_setup > first_write);
        assert_eq!(IWA.get(program.steps[second_setup + 2]), 1);
    }

    #[test]
    fn trickle_moves_work_below_nops_and_reaches_a_fixed_point() {
        let mac = TRA.prep(1) | YSEL.prep(1) | ZERO.mask;
        let mut program = DspProgram {
            steps: vec![DUMMY_ACC, DUMMY_ACC, mac],
            coefs: vec![0, 0, 32],
            madrs: Vec::new(),
        };
        trickle_down(&mut program);
        assert_eq!(program.steps, vec![mac, DUMMY_ACC, DUMMY_ACC]);
        assert_eq!(program.coefs, vec![32, 0, 0]);

        let settled = program.clone();
        trickle_down(&mut program);
        assert_eq!(program, settled);
    }

    #[test]
    fn trickle_respects_coefficients_and_memory_steps() {
        let mac = TRA.prep(1) | YSEL.prep(1) | ZERO.mask;
        let mut blocked = DspProgram {
            steps: vec![DUMMY_ACC, mac],
            coefs: vec![5, 0],
            madrs: Vec::new(),
        };
        let before = blocked.clone();
        trickle_down(&mut blocked);
        assert_eq!(blocked, before);

        let store = DUMMY_ACC | MWT.mask | TABLE.mask | NOFL.mask;
        let mut memory = DspProgram {
            steps: vec![DUMMY_ACC, store],
            coefs: vec![0, 0],
            madrs: Vec::new(),
        };
        let before = memory.clone();
        trickle_down(&mut memory);
        assert_eq!(memory, before);
    }

    #[test]
    fn drop_nops_removes_pairs_only() {
        let mac = TRA.prep(1) | YSEL.prep(1) | ZERO.mask;
        let mut program = DspProgram {
            steps: vec![mac, DUMMY_ACC, DUMMY_ACC, DUMMY_ACC],
            coefs: vec![0, 0, 0, 0],
            madrs: Vec::new(),
        };
        drop_nops(&mut program);
        assert_eq!(program.steps, vec![mac, DUMMY_ACC]);
    }

    #[test]
    fn drop_nops_keeps_nops_with_coefficients() {
        let mut program = DspProgram {
            steps: vec![DUMMY_ACC, DUMMY_ACC, DUMMY_ACC],
            coefs: vec![8, 0, 0],
            madrs: Vec::new(),
        };
        drop_nops(&mut program);
        assert_eq!(program.steps, vec![DUMMY_ACC]);
        assert_eq!(program.coefs, vec![8]);
    }

    #[test]
    fn optimized_programs_keep_the_memory_invariants() {
        let mut program = compiled(
            "MADRS[0] = 0x200\nMADRS[2] = 0x300\n\
             INPUT mems:1\nMAC input, #0x20\nST [temp:3]\n\
             LD madrs:0, mems:4\nMAC [temp:3], yreg:hi\n\
             OUTPUT mixer:0\nST madrs:2+\nLDF [madrs:0/s], mems:5\n",
        );
        optimize(&mut program);

        for (i, &step) in program.steps.iter().enumerate() {
            assert_eq!(step & RESERVED, 0);
            if step & MEM_ACCESS != 0 {
                assert_eq!(i % 2, 1, "memory access at even step {}", i);
            }
            if step & MRD.mask != 0 {
                assert!(program.steps[i + 2] & IWT.mask != 0);
            }
        }
        for i in 1..program.steps.len() {
            assert!(
                !(nop_at(&program, i - 1) && nop_at(&program, i)),
                "adjacent no-ops left at {}",
                i
            );
        }

        // every pass is settled after one full run
        let settled = program.clone();
        trickle_down(&mut program);
        drop_nops(&mut program);
        assert_eq!(program, settled);
    }
}
