//! Per-frame control-flow state.
//!
//! Structured control flow is reproduced without recursion: each frame
//! keeps a mode, a stack of open blocks, and a nesting counter used while
//! skipping. The machine asks [`ControlState::begin`] whether to run or
//! skip each statement before evaluating anything in it, then reports the
//! outcome of a keyword command through [`ControlState::apply`], which
//! answers with the scope and jump effects the machine must carry out.
//!
//! | Event | Mode after | Effect |
//! |---|---|---|
//! | `if`/`elif` true | Condition | push scope |
//! | `if`/`elif` false | NextCondition | skip to next `elif`/`else`/`end` |
//! | `elif`/`else` after a taken branch | NextCondition | skip to `end` |
//! | `else`, nothing taken | Condition | push scope |
//! | `end` of conditional | saved | pop scope if a branch was taken |
//! | `case` | CaseJump | push scope |
//! | `when` matches | Case | |
//! | `when`/`else` after a matched branch | CaseJump | skip to `end` |
//! | `end` of case | saved | pop scope |
//! | `while`/`for` true, first entry | Cycle | push scope |
//! | `while`/`for` false | CycleJump | jump to `end` (or skip) |
//! | `end` in Cycle | Cycle | clear scope, jump to head |
//! | `end` in CycleJump | saved | pop scope |
//! | `break` | CycleJump | unwind inner blocks, jump to `end` |
//! | `continue` | CycleJump | unwind inner blocks, `end` jumps to head |
//! | `def` | ClosureCatching | skip to `end`, then capture the body |

use quill_common::{Command, Object, Value};
use thiserror::Error;

/// Execution mode of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    /// Running a taken conditional branch.
    Condition,
    /// Skipping to the next conditional branch or `end`.
    NextCondition,
    /// Running a matched case branch.
    Case,
    /// Skipping to the next `when`/`else` or `end`.
    CaseJump,
    /// Running a loop body.
    Cycle,
    /// Skipping to the loop's `end`.
    CycleJump,
    /// Skipping over a nested `def` body that will become a closure.
    ClosureCatching,
}

impl Mode {
    pub fn is_skipping(self) -> bool {
        matches!(
            self,
            Mode::NextCondition | Mode::CaseJump | Mode::CycleJump | Mode::ClosureCatching
        )
    }
}

/// What the machine should do with the statement it is about to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Begin {
    /// Evaluate the statement.
    Execute,
    /// Move on without evaluating anything.
    Skip,
    /// Re-entered `for` head: advance the iteration instead of
    /// re-evaluating the sequence expression.
    ForStep,
}

/// Outcome of a keyword command, as reported by the machine.
#[derive(Debug)]
pub enum Event {
    If(bool),
    Elif(bool),
    Else,
    Case(Value),
    When(Vec<Value>),
    While(bool),
    For { var: String, items: Sequence },
    ForStep,
    End,
    Break,
    Continue,
    Def,
}

/// Effects the machine applies, in field order: pops, clear, push, bind,
/// then jump or capture.
#[derive(Debug, Default)]
pub struct Transition {
    pub pop_scopes: usize,
    pub clear_scope: bool,
    pub push_scope: bool,
    /// Bind a loop variable in the innermost scope.
    pub bind: Option<(String, Object)>,
    /// Continue at this statement instead of the next one.
    pub jump: Option<usize>,
    /// A nested `def` closed: capture the statements after this index.
    pub capture: Option<usize>,
}

impl Transition {
    fn jump_to(target: Option<usize>) -> Self {
        Self {
            jump: target,
            ..Self::default()
        }
    }
}

/// Misplaced keyword.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlFault {
    #[error("'{0}' without a matching block")]
    Unmatched(&'static str),

    #[error("'{0}' outside of a loop")]
    OutsideLoop(&'static str),
}

/// What a `for` loop walks, handed out one item per iteration.
#[derive(Debug)]
pub enum Sequence {
    /// Array element copies or string characters, taken on loop entry.
    Items(std::vec::IntoIter<Object>),
    /// `next..end` over ints, produced as the loop advances.
    Range { next: i64, end: i64 },
}

impl Sequence {
    pub fn items(items: Vec<Object>) -> Self {
        Sequence::Items(items.into_iter())
    }

    /// `0..end`; empty when `end` is not positive.
    pub fn range(end: i64) -> Self {
        Sequence::Range { next: 0, end }
    }
}

impl Iterator for Sequence {
    type Item = Object;

    fn next(&mut self) -> Option<Object> {
        match self {
            Sequence::Items(items) => items.next(),
            Sequence::Range { next, end } => {
                if *next >= *end {
                    return None;
                }
                let item = Object::new(Value::Int(*next));
                *next += 1;
                Some(item)
            }
        }
    }
}

#[derive(Debug)]
struct Iteration {
    var: String,
    items: Sequence,
}

#[derive(Debug)]
enum BlockKind {
    Conditional {
        taken: bool,
    },
    Case {
        matched: bool,
        subject: Value,
    },
    Loop {
        keyword: Command,
        tail: Option<usize>,
        iteration: Option<Iteration>,
    },
    Definition,
}

#[derive(Debug)]
struct Block {
    /// Statement index of the opener. For loops, the head to jump back to.
    at: usize,
    saved: Mode,
    kind: BlockKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Break,
    Continue,
}

/// Control-flow state of one frame.
#[derive(Debug)]
pub struct ControlState {
    mode: Mode,
    blocks: Vec<Block>,
    /// Openers seen while skipping whose `end` has not been reached yet.
    skip_depth: usize,
    pending: Option<Exit>,
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlState {
    pub fn new() -> Self {
        Self {
            mode: Mode::Normal,
            blocks: Vec::new(),
            skip_depth: 0,
            pending: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Number of open blocks.
    pub fn depth(&self) -> usize {
        self.blocks.len()
    }

    /// The innermost block still waiting for its `end`, as the opener's
    /// statement index and keyword.
    pub fn unclosed(&self) -> Option<(usize, &'static str)> {
        self.blocks.last().map(|b| {
            let keyword = match &b.kind {
                BlockKind::Conditional { .. } => "if",
                BlockKind::Case { .. } => "case",
                BlockKind::Loop { keyword, .. } => keyword.keyword(),
                BlockKind::Definition => "def",
            };
            (b.at, keyword)
        })
    }

    fn is_loop_head(&self, at: usize) -> bool {
        matches!(self.blocks.last(), Some(Block { at: head, kind: BlockKind::Loop { .. }, .. }) if *head == at)
    }

    /// Decide whether the statement at `at`, headed by `head`, runs.
    pub fn begin(&mut self, head: Option<Command>, at: usize) -> Begin {
        if self.mode.is_skipping() {
            let top = self.blocks.last().map(|b| &b.kind);
            return match head {
                Some(cmd) if cmd.opens_block() => {
                    self.skip_depth += 1;
                    Begin::Skip
                }
                Some(Command::End) if self.skip_depth > 0 => {
                    self.skip_depth -= 1;
                    Begin::Skip
                }
                Some(Command::End) => Begin::Execute,
                Some(Command::Elif | Command::Else)
                    if self.skip_depth == 0
                        && self.mode == Mode::NextCondition
                        && matches!(top, Some(BlockKind::Conditional { taken: false })) =>
                {
                    Begin::Execute
                }
                Some(Command::When | Command::Else)
                    if self.skip_depth == 0
                        && self.mode == Mode::CaseJump
                        && matches!(top, Some(BlockKind::Case { matched: false, .. })) =>
                {
                    Begin::Execute
                }
                _ => Begin::Skip,
            };
        }

        match head {
            // A taken branch ran into its sibling: the rest of the block is skipped.
            Some(Command::Elif | Command::Else) if self.mode == Mode::Condition => {
                self.mode = Mode::NextCondition;
                Begin::Skip
            }
            Some(Command::When | Command::Else) if self.mode == Mode::Case => {
                self.mode = Mode::CaseJump;
                Begin::Skip
            }
            Some(Command::For) if self.is_loop_head(at) => Begin::ForStep,
            _ => Begin::Execute,
        }
    }

    /// Apply a keyword command that ran at statement `at`.
    pub fn apply(&mut self, event: Event, at: usize) -> Result<Transition, ControlFault> {
        match event {
            Event::If(condition) => {
                self.open(at, BlockKind::Conditional { taken: condition });
                Ok(self.branch(condition))
            }
            Event::Elif(condition) => {
                self.expect_untaken_conditional("elif")?;
                if condition {
                    self.mark_taken();
                }
                Ok(self.branch(condition))
            }
            Event::Else => match self.blocks.last().map(|b| &b.kind) {
                Some(BlockKind::Conditional { taken: false }) if self.mode == Mode::NextCondition => {
                    self.mark_taken();
                    Ok(self.branch(true))
                }
                Some(BlockKind::Case { matched: false, .. }) if self.mode == Mode::CaseJump => {
                    self.mark_matched();
                    self.mode = Mode::Case;
                    Ok(Transition::default())
                }
                _ => Err(ControlFault::Unmatched("else")),
            },
            Event::Case(subject) => {
                self.open(at, BlockKind::Case {
                    matched: false,
                    subject,
                });
                self.mode = Mode::CaseJump;
                Ok(Transition {
                    push_scope: true,
                    ..Transition::default()
                })
            }
            Event::When(guards) => {
                let matches = match self.blocks.last().map(|b| &b.kind) {
                    Some(BlockKind::Case {
                        matched: false,
                        subject,
                    }) if self.mode == Mode::CaseJump => guards.iter().any(|g| g == subject),
                    _ => return Err(ControlFault::Unmatched("when")),
                };
                if matches {
                    self.mark_matched();
                    self.mode = Mode::Case;
                }
                Ok(Transition::default())
            }
            Event::While(condition) => {
                let mut t = Transition::default();
                if !self.is_loop_head(at) {
                    self.open(at, BlockKind::Loop {
                        keyword: Command::While,
                        tail: None,
                        iteration: None,
                    });
                    t.push_scope = true;
                }
                self.cycle(condition, &mut t);
                Ok(t)
            }
            Event::For { var, mut items } => {
                let first = items.next();
                self.open(at, BlockKind::Loop {
                    keyword: Command::For,
                    tail: None,
                    iteration: Some(Iteration {
                        var: var.clone(),
                        items,
                    }),
                });
                let mut t = Transition {
                    push_scope: true,
                    ..Transition::default()
                };
                t.bind = first.as_ref().map(|item| (var, item.clone()));
                self.cycle(first.is_some(), &mut t);
                Ok(t)
            }
            Event::ForStep => {
                let item = match self.blocks.last_mut().map(|b| &mut b.kind) {
                    Some(BlockKind::Loop {
                        iteration: Some(it),
                        ..
                    }) => {
                        it.items.next().map(|o| (it.var.clone(), o))
                    }
                    _ => return Err(ControlFault::Unmatched("for")),
                };
                let mut t = Transition::default();
                let more = item.is_some();
                t.bind = item;
                self.cycle(more, &mut t);
                Ok(t)
            }
            Event::End => self.end(at),
            Event::Break => self.leave(Exit::Break),
            Event::Continue => self.leave(Exit::Continue),
            Event::Def => {
                self.open(at, BlockKind::Definition);
                self.mode = Mode::ClosureCatching;
                self.skip_depth = 0;
                Ok(Transition::default())
            }
        }
    }

    fn open(&mut self, at: usize, kind: BlockKind) {
        self.blocks.push(Block {
            at,
            saved: self.mode,
            kind,
        });
    }

    fn branch(&mut self, taken: bool) -> Transition {
        if taken {
            self.mode = Mode::Condition;
            Transition {
                push_scope: true,
                ..Transition::default()
            }
        } else {
            self.mode = Mode::NextCondition;
            self.skip_depth = 0;
            Transition::default()
        }
    }

    /// Enter or skip a loop body. The tail is known once `end` has been
    /// reached at least once.
    fn cycle(&mut self, run: bool, t: &mut Transition) {
        self.pending = None;
        if run {
            self.mode = Mode::Cycle;
        } else {
            self.mode = Mode::CycleJump;
            self.skip_depth = 0;
            t.jump = self.loop_tail();
        }
    }

    fn loop_tail(&self) -> Option<usize> {
        match self.blocks.last().map(|b| &b.kind) {
            Some(BlockKind::Loop { tail, .. }) => *tail,
            _ => None,
        }
    }

    fn expect_untaken_conditional(&self, keyword: &'static str) -> Result<(), ControlFault> {
        match self.blocks.last().map(|b| &b.kind) {
            Some(BlockKind::Conditional { taken: false }) if self.mode == Mode::NextCondition => {
                Ok(())
            }
            _ => Err(ControlFault::Unmatched(keyword)),
        }
    }

    fn mark_taken(&mut self) {
        if let Some(Block {
            kind: BlockKind::Conditional { taken },
            ..
        }) = self.blocks.last_mut()
        {
            *taken = true;
        }
    }

    fn mark_matched(&mut self) {
        if let Some(Block {
            kind: BlockKind::Case { matched, .. },
            ..
        }) = self.blocks.last_mut()
        {
            *matched = true;
        }
    }

    fn end(&mut self, at: usize) -> Result<Transition, ControlFault> {
        let Some(block) = self.blocks.last_mut() else {
            return Err(ControlFault::Unmatched("end"));
        };

        if let BlockKind::Loop { tail, .. } = &mut block.kind {
            let head = block.at;
            match (self.mode, self.pending) {
                (Mode::Cycle, _) => {
                    *tail = Some(at);
                    return Ok(Transition {
                        clear_scope: true,
                        jump: Some(head),
                        ..Transition::default()
                    });
                }
                (Mode::CycleJump, Some(Exit::Continue)) => {
                    *tail = Some(at);
                    self.pending = None;
                    self.mode = Mode::Cycle;
                    return Ok(Transition::jump_to(Some(head)));
                }
                _ => {}
            }
        }

        let Some(block) = self.blocks.pop() else {
            return Err(ControlFault::Unmatched("end"));
        };
        self.mode = block.saved;
        self.skip_depth = 0;
        self.pending = None;

        Ok(match block.kind {
            BlockKind::Conditional { taken } => Transition {
                pop_scopes: usize::from(taken),
                ..Transition::default()
            },
            BlockKind::Case { .. } | BlockKind::Loop { .. } => Transition {
                pop_scopes: 1,
                ..Transition::default()
            },
            BlockKind::Definition => Transition {
                capture: Some(block.at),
                ..Transition::default()
            },
        })
    }

    /// `break` / `continue`: close every block inside the innermost loop and
    /// head for that loop's `end`.
    fn leave(&mut self, exit: Exit) -> Result<Transition, ControlFault> {
        let keyword = match exit {
            Exit::Break => "break",
            Exit::Continue => "continue",
        };
        let loop_index = self
            .blocks
            .iter()
            .rposition(|b| matches!(b.kind, BlockKind::Loop { .. }))
            .ok_or(ControlFault::OutsideLoop(keyword))?;

        let inner = self.blocks.split_off(loop_index + 1);
        let pop_scopes = inner
            .iter()
            .map(|b| match b.kind {
                BlockKind::Conditional { taken } => usize::from(taken),
                BlockKind::Case { .. } => 1,
                _ => 0,
            })
            .sum();

        self.mode = Mode::CycleJump;
        self.pending = Some(exit);
        let jump = self.loop_tail();
        // Without a known tail, skipping must also pass the `end`s of the
        // blocks just closed.
        self.skip_depth = if jump.is_some() { 0 } else { inner.len() };

        Ok(Transition {
            pop_scopes,
            jump,
            ..Transition::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(cs: &mut ControlState, event: Event, at: usize) -> Transition {
        cs.apply(event, at).unwrap()
    }

    // ---- conditionals ----

    #[test]
    fn if_true_pushes_scope_and_runs() {
        let mut cs = ControlState::new();
        let t = apply(&mut cs, Event::If(true), 0);
        assert!(t.push_scope);
        assert_eq!(cs.mode(), Mode::Condition);
    }

    #[test]
    fn if_false_skips_without_scope() {
        let mut cs = ControlState::new();
        let t = apply(&mut cs, Event::If(false), 0);
        assert!(!t.push_scope);
        assert_eq!(cs.mode(), Mode::NextCondition);
        assert_eq!(cs.begin(None, 1), Begin::Skip);
        assert_eq!(cs.begin(Some(Command::Elif), 2), Begin::Execute);
    }

    #[test]
    fn elif_true_after_false_if() {
        let mut cs = ControlState::new();
        apply(&mut cs, Event::If(false), 0);
        let t = apply(&mut cs, Event::Elif(true), 2);
        assert!(t.push_scope);
        assert_eq!(cs.mode(), Mode::Condition);
    }

    #[test]
    fn sibling_after_taken_branch_is_skipped_unevaluated() {
        let mut cs = ControlState::new();
        apply(&mut cs, Event::If(true), 0);
        assert_eq!(cs.begin(Some(Command::Elif), 2), Begin::Skip);
        assert_eq!(cs.mode(), Mode::NextCondition);
        assert_eq!(cs.begin(Some(Command::Else), 3), Begin::Skip);
        assert_eq!(cs.begin(None, 4), Begin::Skip);
        assert_eq!(cs.begin(Some(Command::End), 5), Begin::Execute);
    }

    #[test]
    fn else_after_untaken_branches_runs() {
        let mut cs = ControlState::new();
        apply(&mut cs, Event::If(false), 0);
        apply(&mut cs, Event::Elif(false), 2);
        let t = apply(&mut cs, Event::Else, 4);
        assert!(t.push_scope);
        assert_eq!(cs.mode(), Mode::Condition);
    }

    #[test]
    fn end_of_taken_conditional_pops_scope_and_restores_mode() {
        let mut cs = ControlState::new();
        apply(&mut cs, Event::If(true), 0);
        let t = apply(&mut cs, Event::End, 2);
        assert_eq!(t.pop_scopes, 1);
        assert_eq!(cs.mode(), Mode::Normal);
        assert_eq!(cs.depth(), 0);
    }

    #[test]
    fn end_of_untaken_conditional_pops_nothing() {
        let mut cs = ControlState::new();
        apply(&mut cs, Event::If(false), 0);
        let t = apply(&mut cs, Event::End, 2);
        assert_eq!(t.pop_scopes, 0);
        assert_eq!(cs.mode(), Mode::Normal);
    }

    #[test]
    fn nested_blocks_counted_while_skipping() {
        let mut cs = ControlState::new();
        apply(&mut cs, Event::If(false), 0);
        assert_eq!(cs.begin(Some(Command::While), 1), Begin::Skip);
        assert_eq!(cs.begin(Some(Command::Else), 2), Begin::Skip);
        assert_eq!(cs.begin(Some(Command::End), 3), Begin::Skip);
        assert_eq!(cs.begin(Some(Command::Else), 4), Begin::Execute);
    }

    #[test]
    fn misplaced_else_and_elif() {
        let mut cs = ControlState::new();
        assert_eq!(cs.begin(Some(Command::Else), 0), Begin::Execute);
        assert_eq!(
            cs.apply(Event::Else, 0).unwrap_err(),
            ControlFault::Unmatched("else")
        );
        assert_eq!(
            cs.apply(Event::Elif(true), 0).unwrap_err(),
            ControlFault::Unmatched("elif")
        );
        assert_eq!(
            cs.apply(Event::End, 0).unwrap_err(),
            ControlFault::Unmatched("end")
        );
    }

    // ---- case ----

    #[test]
    fn case_enters_jump_mode_with_scope() {
        let mut cs = ControlState::new();
        let t = apply(&mut cs, Event::Case(Value::Int(2)), 0);
        assert!(t.push_scope);
        assert_eq!(cs.mode(), Mode::CaseJump);
        assert_eq!(cs.begin(Some(Command::When), 1), Begin::Execute);
    }

    #[test]
    fn when_match_runs_branch() {
        let mut cs = ControlState::new();
        apply(&mut cs, Event::Case(Value::Int(2)), 0);
        apply(&mut cs, Event::When(vec![Value::Int(1)]), 1);
        assert_eq!(cs.mode(), Mode::CaseJump);
        apply(&mut cs, Event::When(vec![Value::Int(3), Value::Int(2)]), 3);
        assert_eq!(cs.mode(), Mode::Case);
    }

    #[test]
    fn when_after_match_is_skipped() {
        let mut cs = ControlState::new();
        apply(&mut cs, Event::Case(Value::Int(1)), 0);
        apply(&mut cs, Event::When(vec![Value::Int(1)]), 1);
        assert_eq!(cs.begin(None, 2), Begin::Execute);
        assert_eq!(cs.begin(Some(Command::When), 3), Begin::Skip);
        assert_eq!(cs.mode(), Mode::CaseJump);
        assert_eq!(cs.begin(Some(Command::Else), 4), Begin::Skip);
        let t = apply(&mut cs, Event::End, 6);
        assert_eq!(t.pop_scopes, 1);
        assert_eq!(cs.mode(), Mode::Normal);
    }

    #[test]
    fn case_else_runs_when_nothing_matched() {
        let mut cs = ControlState::new();
        apply(&mut cs, Event::Case(Value::from("x")), 0);
        apply(&mut cs, Event::When(vec![Value::from("y")]), 1);
        assert_eq!(cs.begin(Some(Command::Else), 3), Begin::Execute);
        apply(&mut cs, Event::Else, 3);
        assert_eq!(cs.mode(), Mode::Case);
    }

    #[test]
    fn when_outside_case() {
        let mut cs = ControlState::new();
        assert_eq!(
            cs.apply(Event::When(vec![]), 0).unwrap_err(),
            ControlFault::Unmatched("when")
        );
    }

    // ---- loops ----

    #[test]
    fn while_first_entry_pushes_scope_once() {
        let mut cs = ControlState::new();
        let t = apply(&mut cs, Event::While(true), 0);
        assert!(t.push_scope);
        assert_eq!(cs.mode(), Mode::Cycle);
        let t = apply(&mut cs, Event::End, 3);
        assert!(t.clear_scope);
        assert_eq!(t.jump, Some(0));
        let t = apply(&mut cs, Event::While(true), 0);
        assert!(!t.push_scope);
        assert_eq!(cs.depth(), 1);
    }

    #[test]
    fn while_false_after_cycle_jumps_to_known_tail() {
        let mut cs = ControlState::new();
        apply(&mut cs, Event::While(true), 0);
        apply(&mut cs, Event::End, 3);
        let t = apply(&mut cs, Event::While(false), 0);
        assert_eq!(t.jump, Some(3));
        assert_eq!(cs.mode(), Mode::CycleJump);
        assert_eq!(cs.begin(Some(Command::End), 3), Begin::Execute);
        let t = apply(&mut cs, Event::End, 3);
        assert_eq!(t.pop_scopes, 1);
        assert_eq!(t.jump, None);
        assert_eq!(cs.mode(), Mode::Normal);
        assert_eq!(cs.depth(), 0);
    }

    #[test]
    fn while_false_on_first_entry_skips_body() {
        let mut cs = ControlState::new();
        let t = apply(&mut cs, Event::While(false), 0);
        assert!(t.push_scope);
        assert_eq!(t.jump, None);
        assert_eq!(cs.begin(Some(Command::If), 1), Begin::Skip);
        assert_eq!(cs.begin(Some(Command::End), 2), Begin::Skip);
        assert_eq!(cs.begin(Some(Command::End), 3), Begin::Execute);
    }

    #[test]
    fn break_unwinds_inner_blocks() {
        let mut cs = ControlState::new();
        apply(&mut cs, Event::While(true), 0);
        apply(&mut cs, Event::If(true), 1);
        apply(&mut cs, Event::Case(Value::Int(1)), 2);
        apply(&mut cs, Event::When(vec![Value::Int(1)]), 3);
        let t = apply(&mut cs, Event::Break, 4);
        assert_eq!(t.pop_scopes, 2);
        assert_eq!(t.jump, None);
        assert_eq!(cs.depth(), 1);
        assert_eq!(cs.mode(), Mode::CycleJump);
        // the two inner `end`s are passed over before the loop's own
        assert_eq!(cs.begin(Some(Command::End), 5), Begin::Skip);
        assert_eq!(cs.begin(Some(Command::End), 6), Begin::Skip);
        assert_eq!(cs.begin(Some(Command::End), 7), Begin::Execute);
        let t = apply(&mut cs, Event::End, 7);
        assert_eq!(t.pop_scopes, 1);
        assert_eq!(cs.depth(), 0);
        assert_eq!(cs.mode(), Mode::Normal);
    }

    #[test]
    fn break_with_known_tail_jumps() {
        let mut cs = ControlState::new();
        apply(&mut cs, Event::While(true), 0);
        apply(&mut cs, Event::End, 4);
        apply(&mut cs, Event::While(true), 0);
        apply(&mut cs, Event::If(true), 1);
        let t = apply(&mut cs, Event::Break, 2);
        assert_eq!(t.jump, Some(4));
        assert_eq!(t.pop_scopes, 1);
        assert_eq!(cs.begin(Some(Command::End), 4), Begin::Execute);
    }

    #[test]
    fn continue_returns_to_head_without_clearing() {
        let mut cs = ControlState::new();
        apply(&mut cs, Event::While(true), 0);
        apply(&mut cs, Event::If(true), 1);
        let t = apply(&mut cs, Event::Continue, 2);
        assert_eq!(t.pop_scopes, 1);
        assert_eq!(cs.begin(Some(Command::End), 3), Begin::Skip);
        assert_eq!(cs.begin(Some(Command::End), 4), Begin::Execute);
        let t = apply(&mut cs, Event::End, 4);
        assert!(!t.clear_scope);
        assert_eq!(t.pop_scopes, 0);
        assert_eq!(t.jump, Some(0));
        assert_eq!(cs.mode(), Mode::Cycle);
        assert_eq!(cs.begin(Some(Command::While), 0), Begin::Execute);
    }

    #[test]
    fn break_outside_loop() {
        let mut cs = ControlState::new();
        apply(&mut cs, Event::If(true), 0);
        assert_eq!(
            cs.apply(Event::Break, 1).unwrap_err(),
            ControlFault::OutsideLoop("break")
        );
        assert_eq!(
            cs.apply(Event::Continue, 1).unwrap_err(),
            ControlFault::OutsideLoop("continue")
        );
    }

    #[test]
    fn for_binds_each_item_then_exits() {
        let mut cs = ControlState::new();
        let items = Sequence::items(vec![Object::new(Value::Int(10)), Object::new(Value::Int(20))]);
        let t = apply(
            &mut cs,
            Event::For {
                var: "x".into(),
                items,
            },
            0,
        );
        assert!(t.push_scope);
        let (name, first) = t.bind.unwrap();
        assert_eq!(name, "x");
        assert_eq!(first.value(), Value::Int(10));

        apply(&mut cs, Event::End, 2);
        assert_eq!(cs.begin(Some(Command::For), 0), Begin::ForStep);
        let t = apply(&mut cs, Event::ForStep, 0);
        assert_eq!(t.bind.unwrap().1.value(), Value::Int(20));
        assert_eq!(cs.mode(), Mode::Cycle);

        apply(&mut cs, Event::End, 2);
        let t = apply(&mut cs, Event::ForStep, 0);
        assert!(t.bind.is_none());
        assert_eq!(t.jump, Some(2));
        assert_eq!(cs.mode(), Mode::CycleJump);
    }

    #[test]
    fn for_over_nothing_skips_body() {
        let mut cs = ControlState::new();
        let t = apply(
            &mut cs,
            Event::For {
                var: "x".into(),
                items: Sequence::items(vec![]),
            },
            0,
        );
        assert!(t.push_scope);
        assert!(t.bind.is_none());
        assert_eq!(cs.mode(), Mode::CycleJump);
    }

    #[test]
    fn for_range_is_produced_lazily() {
        let mut cs = ControlState::new();
        let t = apply(
            &mut cs,
            Event::For {
                var: "i".into(),
                items: Sequence::range(4_000_000_000),
            },
            0,
        );
        assert_eq!(t.bind.unwrap().1.value(), Value::Int(0));
        apply(&mut cs, Event::End, 2);
        let t = apply(&mut cs, Event::ForStep, 0);
        assert_eq!(t.bind.unwrap().1.value(), Value::Int(1));
    }

    #[test]
    fn sequence_range_bounds() {
        let values: Vec<Value> = Sequence::range(3).map(|o| o.value()).collect();
        assert_eq!(values, vec![Value::Int(0), Value::Int(1), Value::Int(2)]);
        assert_eq!(Sequence::range(0).count(), 0);
        assert_eq!(Sequence::range(-5).count(), 0);
    }

    // ---- definitions ----

    #[test]
    fn def_catches_body_until_matching_end() {
        let mut cs = ControlState::new();
        apply(&mut cs, Event::While(true), 0);
        apply(&mut cs, Event::Def, 1);
        assert_eq!(cs.mode(), Mode::ClosureCatching);
        assert_eq!(cs.begin(Some(Command::If), 2), Begin::Skip);
        assert_eq!(cs.begin(Some(Command::Return), 3), Begin::Skip);
        assert_eq!(cs.begin(Some(Command::End), 4), Begin::Skip);
        assert_eq!(cs.begin(Some(Command::End), 5), Begin::Execute);
        let t = apply(&mut cs, Event::End, 5);
        assert_eq!(t.capture, Some(1));
        assert_eq!(cs.mode(), Mode::Cycle);
    }

    #[test]
    fn unclosed_reports_innermost_opener() {
        let mut cs = ControlState::new();
        assert_eq!(cs.unclosed(), None);
        apply(&mut cs, Event::While(true), 0);
        apply(&mut cs, Event::Case(Value::Null), 3);
        assert_eq!(cs.unclosed(), Some((3, "case")));
    }
}
