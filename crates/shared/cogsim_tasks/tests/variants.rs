use cogsim::batch::BatchOrchestrator;
use cogsim::context::ContextSupplier;
use cogsim::prng::Prng;
use cogsim::simulator::ChoiceSimulator;
use cogsim::variant::TaskVariant;
use cogsim_tasks::{supplier_for, RlwmContext};
use proptest::prelude::*;

#[test]
fn actions_stay_in_the_valid_subset() {
    for name in TaskVariant::builtin_names() {
        let v = TaskVariant::by_name(name).unwrap();
        let supplier = supplier_for(name).unwrap();
        let batch = BatchOrchestrator::new(4)
            .simulate_batch(&v, supplier.as_ref(), 2024)
            .unwrap();
        let t_len = batch.num_steps;
        let c = batch.batchable_context.shape[2];
        for b in 0..batch.batch_size() {
            for t in 0..batch.subject_steps[b] {
                let action = batch.sim_data.get(&[b, t, 0]);
                match *name {
                    "reversal_learning" => assert!(action == 0.0 || action == 1.0),
                    "three_alt_full_feedback" => assert!((0.0..3.0).contains(&action)),
                    "rlwm" => assert!((0.0..3.0).contains(&action)),
                    "paired_choice" => {
                        let row = (b * t_len + t) * c;
                        let offered = &batch.batchable_context.data[row + 2..row + 4];
                        assert!(offered.contains(&action), "{action} not in {offered:?}");
                    }
                    other => panic!("untested variant {other}"),
                }
                assert_eq!(batch.mask.get(&[b, t]), 1.0);
            }
        }
    }
}

#[test]
fn rlwm_batches_share_one_trial_count() {
    let v = TaskVariant::rlwm().unwrap();
    let batch = BatchOrchestrator::new(3)
        .simulate_batch(&v, &RlwmContext::default(), 11)
        .unwrap();
    assert!((600..=780).contains(&batch.num_steps));
    assert!(batch.subject_steps.iter().all(|&n| n == batch.num_steps));
    assert_eq!(batch.shared_parameters.as_ref().map(|s| s.shape.clone()), Some(vec![3, 2]));
    assert_eq!(batch.batchable_context.shape, vec![3, batch.num_steps, 4]);
}

#[test]
fn rlwm_tables_are_flat_on_every_new_block() {
    let v = TaskVariant::rlwm().unwrap();
    let mut rng = Prng::new(31);
    let ctx = RlwmContext::default().supply(400, &mut rng).unwrap();
    let traj = v
        .trajectory_generator()
        .unwrap()
        .generate(&[0.05, 0.05], ctx.len(), &[], &mut rng)
        .unwrap();
    let mut sim = ChoiceSimulator::new(&v, &[0.1, 3.5], ctx.len()).unwrap();
    let mut prev_block = None;
    for (t, c) in ctx.iter().enumerate() {
        let before = sim.tables().clone();
        let out = sim.step(traj.row(t), c, &mut rng).unwrap();
        let new_block = prev_block != Some((c.block, c.set_size));
        assert_eq!(out.block_reset, new_block, "trial {t}");
        if new_block {
            // Only the presented stimulus row has learned since the reset.
            let cols = sim.tables().cols();
            assert_eq!(sim.tables().rows(), c.set_size as usize);
            for (i, &q) in sim.tables().rl().iter().enumerate() {
                if i / cols != c.stimulus as usize {
                    assert_eq!(q, 1.0 / 3.0);
                }
            }
        } else {
            assert_eq!(before.rows(), sim.tables().rows());
        }
        prev_block = Some((c.block, c.set_size));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn batches_are_deterministic_per_seed(seed in any::<u64>()) {
        let v = TaskVariant::three_alt_full_feedback().unwrap();
        let supplier = supplier_for(v.name).unwrap();
        let orch = BatchOrchestrator::new(2);
        let a = orch.simulate_batch(&v, supplier.as_ref(), seed).unwrap();
        let b = orch.simulate_batch(&v, supplier.as_ref(), seed).unwrap();
        prop_assert_eq!(a, b);
    }
}
