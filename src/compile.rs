use anyhow::Result;
use log::{debug, info};

use tarn_backend::{allocate_registers, linearize, straighten_conditionals};
use tarn_common::cfg::{BlockId, BuilderId, Cfg, CfgBuilder, Value, ValueTable};
use tarn_common::pretty::Prettier;
use tarn_midend::{add_transit_bindings, break_critical_edges, merge_blocks, straighten_loops};

/// A fully lowered procedure: every value is a register, and the block
/// order is the one the final code should be emitted in.
#[derive(Debug)]
pub struct Compiled {
    pub cfg: Cfg,
    pub order: Vec<BlockId>,
}

/// Runs a procedure through the whole middle and back end: freeze the
/// graph, normalize its shape, make variable traffic explicit, allocate
/// registers, and commit a layout.
pub fn compile(
    graph: CfgBuilder,
    entry: BuilderId,
    values: &mut ValueTable,
    registers: &[Value],
) -> Result<Compiled> {
    info!("compiling with {} registers", registers.len());

    let cfg = graph.build(entry);
    dump("built", &cfg, registers);

    let cfg = merge_blocks(cfg);
    let cfg = break_critical_edges(cfg);
    dump("factored", &cfg, registers);

    let cfg = add_transit_bindings(cfg, values);
    dump("transit", &cfg, registers);

    let cfg = allocate_registers(cfg, values, registers)?;
    dump("allocated", &cfg, registers);

    let mut cfg = straighten_loops(cfg);
    let order = linearize(&cfg);
    straighten_conditionals(&mut cfg, &order);
    dump("laid out", &cfg, registers);

    Ok(Compiled { cfg, order })
}

fn dump(stage: &str, cfg: &Cfg, registers: &[Value]) {
    if log::log_enabled!(log::Level::Debug) {
        let prettier = Prettier::new(cfg).with_registers(registers);
        debug!("{}:\n{}", stage, prettier.pretty_cfg());
    }
}
