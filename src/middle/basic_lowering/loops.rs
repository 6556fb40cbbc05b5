//! WHILE, DO and FOR loops, and EXIT.
//!
//! Every loop pushes its `done` block on the loop stack before lowering the
//! body. After the body, `done` becomes the current block; its `terminated`
//! flag records whether code after the loop is dead. That holds only when no
//! edge reaches `done`: the body never falls back into the loop, no `EXIT`
//! targeted it, and no loop test branches there. Every FOR and every tested
//! WHILE or DO has such a test, so in practice only a bare `DO ... LOOP` (or
//! a loop whose test trapped) can leave `done` dead.

use super::{LowerResult, ProcedureLowerer, Unsupported, names::ForHeads};
use crate::{
    frontend::{
        SourceLoc,
        basic::ast::{
            ConditionKind, DoCondition, DoLoop, Expression, ForLoop, LoopKind, Statement,
            TestPosition,
        },
    },
    middle::il::{BlockId, Opcode, TypeKind, Value},
};

enum Heads {
    Single(BlockId),
    Split { positive: BlockId, negative: BlockId },
}

impl ProcedureLowerer<'_, '_> {
    /// Lowers a loop body, returning whether it ended in a terminated block.
    fn lower_loop_body(&mut self, body: &[Statement]) -> bool {
        self.lower_statements(body);
        self.builder.is_terminated()
    }

    /// Pops the innermost loop and continues lowering in its `done` block.
    /// `tested` says whether a loop test branches to `done`.
    fn close_loop(&mut self, done: BlockId, body_terminated: bool, tested: bool) {
        let frame = self.loops.pop();
        debug_assert_eq!(frame.exit, done);

        self.builder.position_at_end(done);
        self.builder.function.blocks[done].terminated =
            body_terminated && !tested && !frame.exit_taken;
    }

    pub(super) fn lower_while(
        &mut self,
        condition: &Expression,
        body: &[Statement],
        loc: SourceLoc,
    ) {
        let labels = self.names.while_loop();
        let head = self.add_block(labels.head);
        let body_block = self.add_block(labels.body);
        let done = self.add_block(labels.done);
        self.loops.push(LoopKind::While, done);

        self.builder.set_loc(loc);
        self.builder.br(head);

        self.builder.position_at_end(head);
        let tested = self.branch_on(condition, body_block, done, loc);

        self.builder.position_at_end(body_block);
        let terminated = self.lower_loop_body(body);
        if !terminated {
            self.builder.set_loc(loc);
            self.builder.br(head);
        }

        self.close_loop(done, terminated, tested);
    }

    pub(super) fn lower_do(&mut self, do_loop: &DoLoop, loc: SourceLoc) {
        let labels = self.names.do_loop();
        let head = self.add_block(labels.head);
        let body = self.add_block(labels.body);
        let done = self.add_block(labels.done);
        self.loops.push(LoopKind::Do, done);

        let condition = do_loop.condition.as_ref();
        let post_test = condition.is_some_and(|c| c.position == TestPosition::Post);

        self.builder.set_loc(loc);
        let mut tested = false;
        if post_test {
            self.builder.br(body);
        } else {
            self.builder.br(head);
            tested = self.lower_do_head(head, body, done, condition, loc);
        }

        self.builder.position_at_end(body);
        let terminated = self.lower_loop_body(&do_loop.body);
        if !terminated {
            self.builder.set_loc(loc);
            self.builder.br(head);
        }

        if post_test {
            // Code after a post-test DO is kept even when the body never
            // reaches the test.
            self.lower_do_head(head, body, done, condition, loc);
            tested = true;
        }

        self.close_loop(done, terminated, tested);
    }

    /// The DO test: loop while the condition holds, or until it does. A bare
    /// `DO ... LOOP` head only jumps to the body. Returns whether the head
    /// can branch to `done`.
    fn lower_do_head(
        &mut self,
        head: BlockId,
        body: BlockId,
        done: BlockId,
        condition: Option<&DoCondition>,
        loc: SourceLoc,
    ) -> bool {
        self.builder.position_at_end(head);
        self.builder.set_loc(loc);

        match condition {
            None => {
                self.builder.br(body);
                false
            }
            Some(condition) => match condition.kind {
                ConditionKind::While => self.branch_on(&condition.expr, body, done, loc),
                ConditionKind::Until => self.branch_on(&condition.expr, done, body, loc),
            },
        }
    }

    /// Lowers a FOR loop. `start`, `end` and `step` are evaluated once,
    /// before the loop. A constant step picks the head comparison now; a
    /// runtime step gets one head per sign and picks between them on entry
    /// and after every increment.
    pub(super) fn lower_for(&mut self, for_loop: &ForLoop, loc: SourceLoc) -> LowerResult<()> {
        let (slot, ty) = self.variable_slot(&for_loop.variable)?;
        if ty != TypeKind::I64 {
            return Err(Unsupported(format!(
                "FOR variable `{}` must be an integer, not {ty}",
                for_loop.variable.name()
            )));
        }

        let start = self.lower_expression(&for_loop.start)?;
        let start = self.coerce(start, TypeKind::I64)?;
        let end = self.lower_expression(&for_loop.end)?;
        let end = self.coerce(end, TypeKind::I64)?;
        let step = match &for_loop.step {
            Some(step) => {
                let step = self.lower_expression(step)?;
                self.coerce(step, TypeKind::I64)?
            }
            None => Value::int(1),
        };

        self.builder.set_loc(loc);
        self.builder.store(TypeKind::I64, slot.clone(), start);

        let constant_step = step.as_const_int();
        let step_sign = match constant_step {
            Some(_) => None,
            None => Some(self.builder.emit_value(
                Opcode::SCmpGE,
                TypeKind::I64,
                vec![step.clone(), Value::int(0)],
            )),
        };

        let labels = self.names.for_loop(constant_step.is_none());
        let heads = match labels.heads {
            ForHeads::Single(head) => Heads::Single(self.add_block(head)),
            ForHeads::Split { positive, negative } => Heads::Split {
                positive: self.add_block(positive),
                negative: self.add_block(negative),
            },
        };
        let body = self.add_block(labels.body);
        let inc = self.add_block(labels.inc);
        let done = self.add_block(labels.done);
        self.loops.push(LoopKind::For, done);

        self.enter_for_heads(&heads, step_sign.as_ref(), loc);

        match heads {
            Heads::Single(head) => {
                let compare = if constant_step.unwrap_or(1) >= 0 {
                    Opcode::SCmpLE
                } else {
                    Opcode::SCmpGE
                };
                self.lower_for_test(head, compare, &slot, &end, body, done, loc);
            }
            Heads::Split { positive, negative } => {
                self.lower_for_test(positive, Opcode::SCmpLE, &slot, &end, body, done, loc);
                self.lower_for_test(negative, Opcode::SCmpGE, &slot, &end, body, done, loc);
            }
        }

        self.builder.position_at_end(body);
        let terminated = self.lower_loop_body(&for_loop.body);
        if !terminated {
            self.builder.set_loc(loc);
            self.builder.br(inc);
        }

        self.builder.position_at_end(inc);
        self.builder.set_loc(loc);
        let current = self.builder.load(TypeKind::I64, slot.clone());
        let next = self
            .builder
            .emit_value(Opcode::IAddOvf, TypeKind::I64, vec![current, step]);
        self.builder.store(TypeKind::I64, slot, next);
        self.enter_for_heads(&heads, step_sign.as_ref(), loc);

        // Every FOR head compares and may leave for `done`.
        self.close_loop(done, terminated, true);
        Ok(())
    }

    fn enter_for_heads(&mut self, heads: &Heads, step_sign: Option<&Value>, loc: SourceLoc) {
        self.builder.set_loc(loc);

        match (heads, step_sign) {
            (Heads::Split { positive, negative }, Some(sign)) => {
                self.builder.cbr(sign.clone(), *positive, *negative)
            }
            (Heads::Single(head), _) => self.builder.br(*head),
            (Heads::Split { positive, .. }, None) => self.builder.br(*positive),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_for_test(
        &mut self,
        head: BlockId,
        compare: Opcode,
        slot: &Value,
        end: &Value,
        body: BlockId,
        done: BlockId,
        loc: SourceLoc,
    ) {
        self.builder.position_at_end(head);
        self.builder.set_loc(loc);

        let current = self.builder.load(TypeKind::I64, slot.clone());
        let condition = self
            .builder
            .emit_value(compare, TypeKind::I64, vec![current, end.clone()]);
        self.builder.cbr(condition, body, done);
    }

    /// Branches to the exit of the innermost matching loop. Outside any
    /// loop there is nothing to branch to.
    pub(super) fn lower_exit(&mut self, kind: Option<LoopKind>, loc: SourceLoc) -> LowerResult<()> {
        self.builder.set_loc(loc);

        match self.loops.take_exit(kind) {
            Some(target) => {
                self.builder.br(target);
                Ok(())
            }
            None => Err(Unsupported(match kind {
                Some(kind) => format!("EXIT {kind:?} outside of a matching loop"),
                None => "EXIT outside of a loop".to_owned(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::{
        frontend::{
            SourceLoc,
            basic::ast::{
                BinaryOperator, Body, ConditionKind, DoCondition, Expression, IfStatement,
                LoopKind, Program, Statement, StatementKind, TestPosition,
            },
        },
        middle::{
            basic_lowering::{LowerOptions, LoweringOutput, Severity, lower_program},
            il::{Function, Module, Opcode, TypeKind, cfg::FunctionCfg, verify::verify_module},
            optimization::{PipelineOptions, mem2reg, run_pipeline},
        },
    };

    type Edges<'f> = Vec<(&'f str, Opcode, Vec<&'f str>)>;

    fn lower_with(main: Vec<Statement>, options: LowerOptions) -> LoweringOutput {
        let program = Program {
            procedures: Vec::new(),
            main: Body::new(main),
        };
        let output = lower_program(&program, &options);
        verify_module(&output.module).unwrap();
        output
    }

    fn lower(main: Vec<Statement>) -> LoweringOutput {
        lower_with(main, LowerOptions::default())
    }

    fn main_of(module: &Module) -> &Function {
        module.function("main").unwrap()
    }

    fn labels(function: &Function) -> Vec<&str> {
        function.blocks.iter().map(|b| b.label.as_str()).collect()
    }

    fn block<'f>(function: &'f Function, label: &str) -> &'f crate::middle::il::BasicBlock {
        function
            .blocks
            .iter()
            .find(|b| b.label == label)
            .unwrap_or_else(|| panic!("no block `{label}`"))
    }

    /// Every block with its terminator and successors, in layout order.
    fn graph(function: &Function) -> Edges<'_> {
        function
            .blocks
            .iter()
            .map(|b| {
                let terminator = b
                    .terminator()
                    .unwrap_or_else(|| panic!("block `{}` is open", b.label));
                let successors: Vec<&str> = terminator.labels.iter().map(String::as_str).collect();
                (b.label.as_str(), terminator.opcode, successors)
            })
            .collect()
    }

    /// Labels of the blocks that call `callee`.
    fn callers<'f>(function: &'f Function, callee: &str) -> Vec<&'f str> {
        function
            .blocks
            .iter()
            .filter(|b| b.instructions.iter().any(|i| i.callee.as_deref() == Some(callee)))
            .map(|b| b.label.as_str())
            .collect()
    }

    /// Runs the optimisation pipeline and checks it left the block graph
    /// alone.
    fn assert_graph_survives_pipeline(mut module: Module, expected: &Edges<'_>) {
        run_pipeline(&mut module, &PipelineOptions::default()).unwrap();
        assert_eq!(&graph(main_of(&module)), expected);
    }

    fn if_then_else(
        condition: Expression,
        then: Vec<Statement>,
        other: Vec<Statement>,
    ) -> Statement {
        Statement::new(StatementKind::If(Box::new(IfStatement {
            condition,
            then_branch: then,
            else_ifs: Vec::new(),
            else_branch: Some(other),
        })))
    }

    fn increment(name: &str) -> Statement {
        Statement::assign(
            name,
            Expression::binary(
                Expression::variable(name),
                BinaryOperator::Add,
                Expression::integer(1),
            ),
        )
    }

    fn lt(lhs: Expression, rhs: Expression) -> Expression {
        Expression::binary(lhs, BinaryOperator::Lt, rhs)
    }

    #[test]
    fn while_loop_blocks() {
        let output = lower(vec![Statement::while_loop(
            lt(Expression::variable("x"), Expression::integer(10)),
            vec![increment("x")],
        )]);

        assert_eq!(
            output.module.to_string(),
            indoc! {"
                func main() -> i64 {
                entry:
                  %0 = alloca ptr 8
                  br loop_head_0
                loop_head_0:
                  %1 = load i64 %0
                  %2 = scmp_lt i1 %1, 10
                  cbr %2, loop_body_0, done_0
                loop_body_0:
                  %3 = load i64 %0
                  %4 = iadd.ovf i64 %3, 1
                  store i64 %0, %4
                  br loop_head_0
                done_0:
                  ret i64 0
                }
            "}
        );

        let main = main_of(&output.module);
        let cfg = FunctionCfg::new(main);
        let head = cfg.block_id("loop_head_0").unwrap();
        let preds = cfg
            .predecessors(head)
            .iter()
            .map(|&b| main.blocks[b].label.as_str())
            .collect::<Vec<_>>();
        assert_eq!(preds, ["entry", "loop_body_0"]);
    }

    #[test]
    fn while_head_gets_one_parameter_after_mem2reg() {
        let mut module = lower(vec![Statement::while_loop(
            lt(Expression::variable("x"), Expression::integer(10)),
            vec![increment("x")],
        )])
        .module;

        mem2reg(&mut module, None);
        verify_module(&module).unwrap();

        let main = main_of(&module);
        let head = block(main, "loop_head_0");
        assert_eq!(head.params.len(), 1);
        assert_eq!(head.params[0].ty, TypeKind::I64);
        assert!(
            main.blocks
                .iter()
                .flat_map(|b| &b.instructions)
                .all(|i| !matches!(i.opcode, Opcode::Alloca | Opcode::Load | Opcode::Store))
        );
    }

    #[test]
    fn for_with_variable_step_splits_heads() {
        let output = lower(vec![Statement::for_loop(
            "i",
            Expression::variable("a"),
            Expression::variable("b"),
            Some(Expression::variable("s")),
            vec![Statement::print(vec![Expression::variable("i")])],
        )]);
        let main = main_of(&output.module);

        assert_eq!(
            labels(main),
            [
                "entry",
                "for_head_pos_0",
                "for_head_neg_0",
                "for_body_0",
                "for_inc_0",
                "for_done_0",
            ]
        );

        let entry = block(main, "entry").terminator().unwrap();
        let inc = block(main, "for_inc_0").terminator().unwrap();
        assert_eq!(entry.opcode, Opcode::CBr);
        assert_eq!(inc.opcode, Opcode::CBr);
        assert_eq!(entry.labels, ["for_head_pos_0", "for_head_neg_0"]);
        assert_eq!(inc.labels, entry.labels);
        assert_eq!(inc.operands, entry.operands);

        let compare = |label| {
            block(main, label)
                .instructions
                .iter()
                .find(|i| i.opcode.is_comparison())
                .map(|i| i.opcode)
        };
        assert_eq!(compare("for_head_pos_0"), Some(Opcode::SCmpLE));
        assert_eq!(compare("for_head_neg_0"), Some(Opcode::SCmpGE));
    }

    #[test]
    fn constant_step_picks_comparison() {
        let counting_down = lower(vec![Statement::for_loop(
            "i",
            Expression::integer(10),
            Expression::integer(1),
            Some(Expression::integer(-1)),
            Vec::new(),
        )]);
        let counting_up = lower(vec![Statement::for_loop(
            "i",
            Expression::integer(1),
            Expression::integer(10),
            None,
            Vec::new(),
        )]);

        let down = counting_down.module.to_string();
        let up = counting_up.module.to_string();

        assert!(down.contains("scmp_ge i1"));
        assert!(down.contains("iadd.ovf i64 %3, -1"));
        assert!(up.contains("scmp_le i1"));
        assert!(up.contains("iadd.ovf i64 %3, 1"));
        assert!(!up.contains("for_head_pos"));
        assert_eq!(
            labels(main_of(&counting_up.module)),
            ["entry", "for_head_0", "for_body_0", "for_inc_0", "for_done_0"]
        );
    }

    #[test]
    fn nested_exit_targets_inner_loop() {
        let output = lower(vec![Statement::while_loop(
            Expression::variable("a"),
            vec![Statement::while_loop(
                Expression::variable("b"),
                vec![Statement::exit(None)],
            )],
        )]);
        let main = main_of(&output.module);

        let inner_body = block(main, "loop_body_1").terminator().unwrap();
        assert_eq!(inner_body.opcode, Opcode::Br);
        assert_eq!(inner_body.labels, ["done_1"]);

        // The inner loop was exited, so the outer body goes on after it.
        let inner_done = block(main, "done_1").terminator().unwrap();
        assert_eq!(inner_done.labels, ["loop_head_0"]);
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn exit_with_kind_skips_other_loops() {
        let output = lower(vec![Statement::for_loop(
            "i",
            Expression::integer(1),
            Expression::integer(3),
            None,
            vec![Statement::while_loop(
                Expression::boolean(true),
                vec![Statement::exit(Some(LoopKind::For))],
            )],
        )]);
        let main = main_of(&output.module);

        assert_eq!(
            block(main, "loop_body_1").terminator().unwrap().labels,
            ["for_done_0"]
        );
    }

    #[test]
    fn empty_while_loops_back_immediately() {
        let output = lower(vec![Statement::while_loop(
            Expression::boolean(false),
            Vec::new(),
        )]);
        let main = main_of(&output.module);

        let body = block(main, "loop_body_0");
        assert_eq!(body.instructions.len(), 1);
        assert_eq!(body.successor_labels(), ["loop_head_0"]);
    }

    #[test]
    fn exit_for_from_inner_while_keeps_rest_of_for_body() {
        let output = lower(vec![Statement::for_loop(
            "i",
            Expression::integer(1),
            Expression::integer(3),
            None,
            vec![
                Statement::while_loop(
                    Expression::variable("c"),
                    vec![Statement::exit(Some(LoopKind::For))],
                ),
                Statement::print(vec![Expression::variable("i")]),
            ],
        )]);
        let main = main_of(&output.module);

        let expected: Edges<'_> = vec![
            ("entry", Opcode::Br, vec!["for_head_0"]),
            ("for_head_0", Opcode::CBr, vec!["for_body_0", "for_done_0"]),
            ("for_body_0", Opcode::Br, vec!["loop_head_1"]),
            ("for_inc_0", Opcode::Br, vec!["for_head_0"]),
            ("for_done_0", Opcode::Ret, vec![]),
            ("loop_head_1", Opcode::CBr, vec!["loop_body_1", "done_1"]),
            ("loop_body_1", Opcode::Br, vec!["for_done_0"]),
            ("done_1", Opcode::Br, vec!["for_inc_0"]),
        ];
        assert_eq!(graph(main), expected);
        assert_eq!(callers(main, "rt_print_i64"), ["done_1"]);
        assert!(output.diagnostics.is_empty());

        assert_graph_survives_pipeline(output.module, &expected);
    }

    #[test]
    fn exit_for_from_bare_do_drops_unreachable_code() {
        let output = lower(vec![Statement::for_loop(
            "i",
            Expression::integer(1),
            Expression::integer(3),
            None,
            vec![
                Statement::do_loop(None, vec![Statement::exit(Some(LoopKind::For))]),
                Statement::print(vec![Expression::variable("i")]),
            ],
        )]);
        let main = main_of(&output.module);

        assert!(callers(main, "rt_print_i64").is_empty());
        assert!(block(main, "do_done_1").successor_labels().is_empty());
        assert_eq!(output.diagnostics.len(), 1);
        assert!(output.diagnostics[0].message.contains("do_done_1"));
        assert_eq!(
            block(main, "for_done_0").terminator().map(|t| t.opcode),
            Some(Opcode::Ret)
        );
    }

    #[test]
    fn return_inside_while_keeps_following_code() {
        let output = lower(vec![
            Statement::while_loop(Expression::boolean(true), vec![Statement::ret(None)]),
            Statement::print(vec![Expression::integer(1)]),
        ]);
        let main = main_of(&output.module);

        assert_eq!(callers(main, "rt_print_i64"), ["done_0"]);
        assert!(output.diagnostics.is_empty());

        let counted = lower(vec![
            Statement::for_loop(
                "i",
                Expression::integer(1),
                Expression::integer(0),
                None,
                vec![Statement::ret(None)],
            ),
            Statement::print(vec![Expression::integer(1)]),
        ]);
        let main = main_of(&counted.module);

        assert_eq!(callers(main, "rt_print_i64"), ["for_done_0"]);
        assert_eq!(block(main, "for_inc_0").successor_labels(), ["for_head_0"]);
        assert!(counted.diagnostics.is_empty());
    }

    #[test]
    fn bare_do_that_never_falls_through_closes_done() {
        let output = lower(vec![
            Statement::do_loop(None, vec![Statement::ret(None)]),
            Statement::print(vec![Expression::integer(1)]),
        ]);
        let main = main_of(&output.module);

        assert!(output.module.find_extern("rt_print_i64").is_none());
        assert_eq!(
            block(main, "do_done_0").terminator().map(|t| t.opcode),
            Some(Opcode::Ret)
        );
        assert_eq!(output.diagnostics.len(), 1);
        assert!(output.diagnostics[0].message.contains("do_done_0"));
    }

    #[test]
    fn return_in_nested_while_keeps_outer_body() {
        let output = lower(vec![
            Statement::while_loop(
                Expression::variable("a"),
                vec![
                    Statement::while_loop(Expression::variable("b"), vec![Statement::ret(None)]),
                    Statement::print(vec![Expression::variable("x")]),
                ],
            ),
            Statement::print(vec![Expression::variable("y")]),
        ]);
        let main = main_of(&output.module);

        let expected: Edges<'_> = vec![
            ("entry", Opcode::Br, vec!["loop_head_0"]),
            ("loop_head_0", Opcode::CBr, vec!["loop_body_0", "done_0"]),
            ("loop_body_0", Opcode::Br, vec!["loop_head_1"]),
            ("done_0", Opcode::Ret, vec![]),
            ("loop_head_1", Opcode::CBr, vec!["loop_body_1", "done_1"]),
            ("loop_body_1", Opcode::Ret, vec![]),
            ("done_1", Opcode::Br, vec!["loop_head_0"]),
        ];
        assert_eq!(graph(main), expected);
        assert_eq!(callers(main, "rt_print_i64"), ["done_0", "done_1"]);
        assert!(output.diagnostics.is_empty());

        assert_graph_survives_pipeline(output.module, &expected);
    }

    #[test]
    fn dead_done_inside_outer_loop() {
        let output = lower(vec![
            Statement::while_loop(
                Expression::variable("a"),
                vec![
                    Statement::do_loop(None, vec![Statement::ret(None)]),
                    Statement::print(vec![Expression::variable("x")]),
                ],
            ),
            Statement::print(vec![Expression::variable("y")]),
        ]);
        let main = main_of(&output.module);

        let expected: Edges<'_> = vec![
            ("entry", Opcode::Br, vec!["loop_head_0"]),
            ("loop_head_0", Opcode::CBr, vec!["loop_body_0", "done_0"]),
            ("loop_body_0", Opcode::Br, vec!["do_head_1"]),
            ("done_0", Opcode::Ret, vec![]),
            ("do_head_1", Opcode::Br, vec!["do_body_1"]),
            ("do_body_1", Opcode::Ret, vec![]),
            ("do_done_1", Opcode::Ret, vec![]),
        ];
        assert_eq!(graph(main), expected);
        assert_eq!(callers(main, "rt_print_i64"), ["done_0"]);
        assert_eq!(output.diagnostics.len(), 1);
        assert!(output.diagnostics[0].message.contains("do_done_1"));

        assert_graph_survives_pipeline(output.module, &expected);
    }

    #[test]
    fn if_arm_ending_in_loop() {
        let dead = lower(vec![
            if_then_else(
                Expression::variable("c"),
                vec![Statement::do_loop(None, vec![Statement::ret(None)])],
                vec![Statement::print(vec![Expression::integer(2)])],
            ),
            Statement::print(vec![Expression::integer(3)]),
        ]);
        let main = main_of(&dead.module);

        let expected: Edges<'_> = vec![
            ("entry", Opcode::Br, vec!["if_test_0"]),
            ("if_test_0", Opcode::CBr, vec!["if_then_0", "if_else_0"]),
            ("if_then_0", Opcode::Br, vec!["do_head_0"]),
            ("if_else_0", Opcode::Br, vec!["if_exit_0"]),
            ("do_head_0", Opcode::Br, vec!["do_body_0"]),
            ("do_body_0", Opcode::Ret, vec![]),
            ("do_done_0", Opcode::Ret, vec![]),
            ("if_exit_0", Opcode::Ret, vec![]),
        ];
        assert_eq!(graph(main), expected);
        assert_eq!(callers(main, "rt_print_i64"), ["if_else_0", "if_exit_0"]);
        assert_eq!(dead.diagnostics.len(), 1);
        assert_graph_survives_pipeline(dead.module, &expected);

        let live = lower(vec![
            if_then_else(
                Expression::variable("c"),
                vec![Statement::while_loop(
                    Expression::variable("d"),
                    vec![Statement::ret(None)],
                )],
                Vec::new(),
            ),
            Statement::print(vec![Expression::integer(3)]),
        ]);
        let main = main_of(&live.module);

        let expected: Edges<'_> = vec![
            ("entry", Opcode::Br, vec!["if_test_0"]),
            ("if_test_0", Opcode::CBr, vec!["if_then_0", "if_else_0"]),
            ("if_then_0", Opcode::Br, vec!["loop_head_0"]),
            ("if_else_0", Opcode::Br, vec!["if_exit_0"]),
            ("loop_head_0", Opcode::CBr, vec!["loop_body_0", "done_0"]),
            ("loop_body_0", Opcode::Ret, vec![]),
            ("done_0", Opcode::Br, vec!["if_exit_0"]),
            ("if_exit_0", Opcode::Ret, vec![]),
        ];
        assert_eq!(graph(main), expected);
        assert!(live.diagnostics.is_empty());
        assert_graph_survives_pipeline(live.module, &expected);
    }

    #[test]
    fn exit_outside_loop_traps() {
        let output = lower(vec![
            Statement::exit(None).at(SourceLoc::new(1, 4, 1)),
            Statement::print(vec![Expression::integer(1)]),
        ]);
        let main = main_of(&output.module);

        let entry = &main.blocks[main.entry().unwrap()];
        assert_eq!(entry.terminator().map(|t| t.opcode), Some(Opcode::Trap));
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].severity, Severity::Note);
        assert_eq!(output.diagnostics[0].loc, SourceLoc::new(1, 4, 1));
    }

    #[test]
    fn float_induction_variable_is_unsupported() {
        let output = lower(vec![Statement::for_loop(
            "x#",
            Expression::integer(1),
            Expression::integer(2),
            None,
            Vec::new(),
        )]);

        assert_eq!(output.diagnostics.len(), 1);
        assert!(output.diagnostics[0].message.contains("must be an integer"));
    }

    #[test]
    fn do_loop_variants() {
        let condition = |position, kind| {
            Some(DoCondition {
                position,
                kind,
                expr: lt(Expression::variable("n"), Expression::integer(3)),
            })
        };

        let pre_while = lower(vec![Statement::do_loop(
            condition(TestPosition::Pre, ConditionKind::While),
            vec![increment("n")],
        )]);
        let main = main_of(&pre_while.module);
        assert_eq!(labels(main), ["entry", "do_head_0", "do_body_0", "do_done_0"]);
        assert_eq!(block(main, "entry").successor_labels(), ["do_head_0"]);
        assert_eq!(
            block(main, "do_head_0").successor_labels(),
            ["do_body_0", "do_done_0"]
        );

        let post_until = lower(vec![Statement::do_loop(
            condition(TestPosition::Post, ConditionKind::Until),
            vec![increment("n")],
        )]);
        let main = main_of(&post_until.module);
        assert_eq!(block(main, "entry").successor_labels(), ["do_body_0"]);
        assert_eq!(block(main, "do_body_0").successor_labels(), ["do_head_0"]);
        assert_eq!(
            block(main, "do_head_0").successor_labels(),
            ["do_done_0", "do_body_0"]
        );

        let bare = lower(vec![Statement::do_loop(None, vec![Statement::exit(Some(LoopKind::Do))])]);
        let main = main_of(&bare.module);
        assert_eq!(block(main, "do_head_0").successor_labels(), ["do_body_0"]);
        assert_eq!(block(main, "do_body_0").successor_labels(), ["do_done_0"]);
        assert!(bare.diagnostics.is_empty());
    }

    #[test]
    fn post_test_do_always_reaches_done() {
        let output = lower(vec![
            Statement::do_loop(
                Some(DoCondition {
                    position: TestPosition::Post,
                    kind: ConditionKind::While,
                    expr: Expression::boolean(true),
                }),
                vec![Statement::ret(None)],
            ),
            Statement::print(vec![Expression::integer(1)]),
        ]);

        assert!(output.module.find_extern("rt_print_i64").is_some());
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn lowering_is_deterministic() {
        let program = || {
            vec![
                Statement::for_loop(
                    "i",
                    Expression::integer(1),
                    Expression::variable("n"),
                    Some(Expression::variable("s")),
                    vec![Statement::while_loop(
                        lt(Expression::variable("j"), Expression::variable("i")),
                        vec![increment("j")],
                    )],
                ),
                Statement::do_loop(None, vec![Statement::exit(None)]),
            ]
        };

        assert_eq!(
            lower(program()).module.to_string(),
            lower(program()).module.to_string()
        );
    }

    #[test]
    fn mangled_labels_are_unique() {
        let output = lower_with(
            vec![
                Statement::while_loop(
                    Expression::boolean(true),
                    vec![Statement::while_loop(
                        Expression::boolean(true),
                        vec![Statement::exit(None)],
                    )],
                ),
                Statement::for_loop(
                    "i",
                    Expression::integer(1),
                    Expression::integer(2),
                    Some(Expression::variable("s")),
                    Vec::new(),
                ),
            ],
            LowerOptions {
                use_block_namer: false,
            },
        );
        let main = main_of(&output.module);

        let mut seen = labels(main);
        let total = seen.len();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), total);
        assert!(seen.iter().filter(|l| **l != "entry").all(|l| l.starts_with('L')));
    }

    #[test]
    fn loop_instructions_carry_statement_location() {
        let loc = SourceLoc::new(1, 7, 3);
        let output = lower(vec![
            Statement::while_loop(
                lt(Expression::variable("x"), Expression::integer(10)),
                Vec::new(),
            )
            .at(loc),
        ]);
        let main = main_of(&output.module);

        for label in ["loop_head_0", "loop_body_0"] {
            assert!(block(main, label).instructions.iter().all(|i| i.loc == loc));
        }
        assert_eq!(block(main, "entry").terminator().unwrap().loc, loc);
    }
}
