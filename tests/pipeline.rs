use tarn_backend::AllocError;
use tarn_common::cfg::{
    BuilderId, Cfg, CfgBuilder, Termination, Value, ValueTable, Variable,
};
use tarn_common::ops::{Arith, Arithmetic, Literal, Relation, Retval, TacConditional};
use tarnc::compile;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn registers(values: &mut ValueTable, count: usize) -> Vec<Value> {
    (0..count).map(|_| values.fresh()).collect()
}

fn assert_all_in_registers(cfg: &Cfg, registers: &[Value]) {
    for id in cfg.ids() {
        let block = cfg.get(id);

        for value in block.used().values().chain(block.defd().values()) {
            assert!(registers.contains(value), "unallocated value at a boundary");
        }

        for op in block.ops() {
            for operand in op.inputs().iter().chain(op.outputs().iter()) {
                if !operand.no_alloc {
                    assert!(registers.contains(&operand.value), "unallocated operand");
                }
            }
        }

        for operand in block.termination().inputs() {
            if !operand.no_alloc {
                assert!(registers.contains(&operand.value), "unallocated conditional input");
            }
        }
    }
}

/// sum = 0; i = 0; while i < 10 { sum = sum + i; i = i + 1 }; return sum
fn counting_loop(values: &mut ValueTable) -> (CfgBuilder, BuilderId) {
    let sum = Variable::new(0);
    let i = Variable::new(1);

    let mut graph = CfgBuilder::new();
    let entry = graph.block();
    let head = graph.block();
    let body = graph.block();
    let done = graph.block();

    let zero = values.fresh();
    let zero_too = values.fresh();
    graph.get_mut(entry).add(Box::new(Literal {
        result: zero,
        value: 0,
    }));
    graph.get_mut(entry).add(Box::new(Literal {
        result: zero_too,
        value: 0,
    }));
    graph.get_mut(entry).export_variable_value(sum, zero);
    graph.get_mut(entry).export_variable_value(i, zero_too);
    graph.get_mut(entry).terminate_straight(head);

    let current = graph.get_mut(head).import_variable_value(values, i);
    let limit = values.fresh();
    graph.get_mut(head).add(Box::new(Literal {
        result: limit,
        value: 10,
    }));
    graph.get_mut(head).terminate_branch(
        body,
        done,
        Box::new(TacConditional::new(current, limit, Relation::Less)),
    );

    let running = graph.get_mut(body).import_variable_value(values, sum);
    let counter = graph.get_mut(body).import_variable_value(values, i);
    let new_sum = values.fresh();
    let one = values.fresh();
    let new_counter = values.fresh();
    graph.get_mut(body).add(Box::new(Arithmetic {
        result: new_sum,
        left: running,
        right: counter,
        op: Arith::Add,
    }));
    graph.get_mut(body).add(Box::new(Literal { result: one, value: 1 }));
    graph.get_mut(body).add(Box::new(Arithmetic {
        result: new_counter,
        left: counter,
        right: one,
        op: Arith::Add,
    }));
    graph.get_mut(body).export_variable_value(sum, new_sum);
    graph.get_mut(body).export_variable_value(i, new_counter);
    graph.get_mut(body).terminate_straight(head);

    let result = graph.get_mut(done).import_variable_value(values, sum);
    graph.get_mut(done).add(Box::new(Retval {
        index: 0,
        value: result,
    }));
    graph.get_mut(done).terminate_exit();

    (graph, entry)
}

#[test]
fn a_loop_compiles_onto_four_registers() {
    init_logging();

    let mut values = ValueTable::new();
    let regs = registers(&mut values, 4);

    let (graph, entry) = counting_loop(&mut values);
    let compiled = compile(graph, entry, &mut values, &regs).unwrap();

    assert_all_in_registers(&compiled.cfg, &regs);
    assert_eq!(compiled.order.len(), compiled.cfg.len());
    assert_eq!(compiled.order[0], compiled.cfg.entry());
}

#[test]
fn the_committed_order_has_no_branch_into_the_next_block() {
    init_logging();

    let mut values = ValueTable::new();
    let regs = registers(&mut values, 4);

    let (graph, entry) = counting_loop(&mut values);
    let compiled = compile(graph, entry, &mut values, &regs).unwrap();

    for window in compiled.order.windows(2) {
        if let Termination::Branch { then, owise, .. } =
            compiled.cfg.get(window[0]).termination()
        {
            if then != owise {
                assert_ne!(*then, window[1], "taken arm should never be the fall-through");
            }
        }
    }
}

#[test]
fn a_diamond_merges_its_bindings_through_copies() {
    init_logging();

    let mut values = ValueTable::new();
    let regs = registers(&mut values, 3);
    let x = Variable::new(0);

    let mut graph = CfgBuilder::new();
    let top = graph.block();
    let left = graph.block();
    let right = graph.block();
    let bottom = graph.block();

    let a = values.fresh();
    graph.get_mut(top).add(Box::new(Literal { result: a, value: 0 }));
    graph.get_mut(top).terminate_branch(
        left,
        right,
        Box::new(TacConditional::new(a, a, Relation::Equal)),
    );

    let b = values.fresh();
    graph.get_mut(left).add(Box::new(Literal { result: b, value: 1 }));
    graph.get_mut(left).export_variable_value(x, b);
    graph.get_mut(left).terminate_straight(bottom);

    let c = values.fresh();
    graph.get_mut(right).add(Box::new(Literal { result: c, value: 2 }));
    graph.get_mut(right).export_variable_value(x, c);
    graph.get_mut(right).terminate_straight(bottom);

    let v = graph.get_mut(bottom).import_variable_value(&mut values, x);
    graph.get_mut(bottom).add(Box::new(Retval { index: 0, value: v }));
    graph.get_mut(bottom).terminate_exit();

    let compiled = compile(graph, top, &mut values, &regs).unwrap();
    assert_all_in_registers(&compiled.cfg, &regs);

    // both arms still define x before the join reads it
    let join = compiled
        .cfg
        .ids()
        .find(|id| compiled.cfg.get(*id).joins())
        .unwrap();
    let import = *compiled.cfg.get(join).used().values().next().unwrap();
    for pred in compiled.cfg.get(join).predecessors() {
        assert!(compiled.cfg.get(*pred).def_site(import).is_some());
    }
}

#[test]
fn straight_chains_collapse_into_one_block() {
    init_logging();

    let mut values = ValueTable::new();
    let regs = registers(&mut values, 2);
    let x = Variable::new(0);

    let mut graph = CfgBuilder::new();
    let first = graph.block();
    let second = graph.block();
    let third = graph.block();

    let a = values.fresh();
    graph.get_mut(first).add(Box::new(Literal { result: a, value: 2 }));
    graph.get_mut(first).export_variable_value(x, a);
    graph.get_mut(first).terminate_straight(second);

    let v = graph.get_mut(second).import_variable_value(&mut values, x);
    let b = values.fresh();
    graph.get_mut(second).add(Box::new(Arithmetic {
        result: b,
        left: v,
        right: v,
        op: Arith::Mul,
    }));
    graph.get_mut(second).export_variable_value(x, b);
    graph.get_mut(second).terminate_straight(third);

    let w = graph.get_mut(third).import_variable_value(&mut values, x);
    graph.get_mut(third).add(Box::new(Retval { index: 0, value: w }));
    graph.get_mut(third).terminate_exit();

    let compiled = compile(graph, first, &mut values, &regs).unwrap();

    assert_eq!(compiled.cfg.len(), 1);
    assert_all_in_registers(&compiled.cfg, &regs);
}

#[test]
fn running_out_of_registers_surfaces_the_failure() {
    init_logging();

    let mut values = ValueTable::new();
    let regs = registers(&mut values, 2);

    let mut graph = CfgBuilder::new();
    let entry = graph.block();

    let a = values.fresh();
    let b = values.fresh();
    let c = values.fresh();
    graph.get_mut(entry).add(Box::new(Literal { result: a, value: 1 }));
    graph.get_mut(entry).add(Box::new(Literal { result: b, value: 2 }));
    graph.get_mut(entry).add(Box::new(Literal { result: c, value: 3 }));
    graph.get_mut(entry).add(Box::new(Retval { index: 0, value: a }));
    graph.get_mut(entry).add(Box::new(Retval { index: 1, value: b }));
    graph.get_mut(entry).add(Box::new(Retval { index: 2, value: c }));
    graph.get_mut(entry).terminate_exit();

    let err = compile(graph, entry, &mut values, &regs).unwrap_err();
    let err = err.downcast_ref::<AllocError>().unwrap();

    assert_eq!(err.registers, 2);
    assert!(!err.values.is_empty());
}
