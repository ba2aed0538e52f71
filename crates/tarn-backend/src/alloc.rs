use log::{debug, info};

use tarn_common::cfg::{
    substitute, Cfg, CfgRewriter, CodeBuilder, Termination, Value, ValueTable,
};

use crate::coloring::{color, AllocError};
use crate::interference::interference;
use crate::ssa::bind_phis;

/// Chaitin-Briggs register allocation over a graph whose critical edges
/// are broken and whose exports carry exactly the live variables: lower
/// the cross-block bindings to copies, build the interference graph
/// against the `registers` as precolored values, color it, and rewrite
/// every value to the register value it was assigned. Copies whose two
/// ends coalesced onto the same register disappear.
pub fn allocate_registers(
    cfg: Cfg,
    values: &mut ValueTable,
    registers: &[Value],
) -> Result<Cfg, AllocError> {
    info!("allocating {} registers", registers.len());

    let cfg = bind_phis(cfg, values);
    let graph = interference(&cfg, registers);
    let colors = color(registers, graph)?;

    debug!("{} values colored", colors.len());

    let mut rewriter = CfgRewriter::new();
    for id in cfg.ids() {
        if let Termination::Branch { conditional, .. } = cfg.get(id).termination() {
            rewriter.recondition(&cfg, id, conditional.copy(&colors));
        }
    }

    Ok(rewriter.rewrite_with(&cfg, |cfg, block| {
        CodeBuilder::recreate_with(
            cfg.get(block),
            |value| substitute(&colors, value),
            |op| {
                if let Some(pair) = op.as_copy() {
                    if let (Some(to), Some(from)) =
                        (colors.get(&pair.destination), colors.get(&pair.source))
                    {
                        if to == from {
                            return Vec::new();
                        }
                    }
                }
                vec![op.copy(&colors)]
            },
            |value| substitute(&colors, value),
        )
    }))
}
