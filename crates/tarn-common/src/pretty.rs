use std::collections::HashMap;

use pretty::{Arena, DocAllocator, DocBuilder};

use crate::cfg::{reverse_post_order, BlockId, Cfg, Termination, Value, Variable};

/// Renders a graph for logs and test failures. Blocks are numbered in
/// reverse postorder and variables by first appearance, so two runs
/// over equal graphs print identically.
pub struct Prettier<'a> {
    cfg: &'a Cfg,
    registers: Vec<Value>,
    allocator: Arena<'a>,
    width: usize,

    order: Vec<BlockId>,
    numbers: HashMap<BlockId, usize>,
    variables: HashMap<Variable, usize>,
}

impl<'a> Prettier<'a> {
    pub fn new(cfg: &'a Cfg) -> Self {
        let order = reverse_post_order(cfg);
        let numbers = order
            .iter()
            .enumerate()
            .map(|(number, block)| (*block, number))
            .collect();

        let mut variables = HashMap::new();
        for block in &order {
            let block = cfg.get(*block);
            for variable in block.used().keys().chain(block.defd().keys()) {
                let number = variables.len();
                variables.entry(*variable).or_insert(number);
            }
        }

        Self {
            cfg,
            registers: Vec::new(),
            allocator: Arena::new(),
            width: 80,
            order,
            numbers,
            variables,
        }
    }

    /// Values in `registers` print as `r0`, `r1`, ... instead of their
    /// raw indices.
    pub fn with_registers(self, registers: &[Value]) -> Self {
        Self {
            registers: registers.to_vec(),
            ..self
        }
    }

    #[must_use]
    pub fn pretty_cfg(&'a self) -> String {
        let doc = self.allocator.intersperse(
            self.order.iter().map(|block| self.doc_block(*block)),
            self.allocator.hardline().append(self.allocator.hardline()),
        );

        let mut res = Vec::new();
        doc.render(self.width, &mut res).unwrap();
        String::from_utf8(res).unwrap()
    }

    fn doc_block(&'a self, id: BlockId) -> DocBuilder<Arena<'a>> {
        let block = self.cfg.get(id);
        let namer = |value: Value| self.value_name(value);

        let mut lines = Vec::new();

        if !block.predecessors().is_empty() {
            let preds: Vec<String> = block
                .predecessors()
                .iter()
                .map(|pred| format!("#{}", self.numbers[pred]))
                .collect();
            lines.push(self.allocator.text(format!("// pred: {}", preds.join(", "))));
        }

        for (variable, value) in block.used() {
            lines.push(self.allocator.text(format!(
                "// in: {} = {}",
                self.value_name(*value),
                self.variable_name(*variable)
            )));
        }

        for op in block.ops() {
            lines.push(self.allocator.text(op.render(&namer)));
        }

        for (variable, value) in block.defd() {
            lines.push(self.allocator.text(format!(
                "// out: {} = {}",
                self.variable_name(*variable),
                self.value_name(*value)
            )));
        }

        lines.push(match block.termination() {
            Termination::Straight { next } => {
                self.allocator.text(format!("goto #{}", self.numbers[next]))
            }
            Termination::Branch {
                then,
                owise,
                conditional,
            } => self.allocator.text(format!(
                "if {} then #{} else #{}",
                conditional.render(&namer),
                self.numbers[then],
                self.numbers[owise]
            )),
            Termination::Exit => self.allocator.text("exit"),
        });

        let body = self.allocator.intersperse(lines, self.allocator.hardline());

        self.allocator
            .text(format!("#{}:", self.numbers[&id]))
            .append(self.allocator.hardline().append(body).nest(2))
    }

    fn value_name(&self, value: Value) -> String {
        match self.registers.iter().position(|register| *register == value) {
            Some(register) => format!("r{}", register),
            None => format!("x{}", value.index()),
        }
    }

    fn variable_name(&self, variable: Variable) -> String {
        match self.variables.get(&variable) {
            Some(number) => format!("v{}", number),
            None => format!("{:?}", variable),
        }
    }
}
