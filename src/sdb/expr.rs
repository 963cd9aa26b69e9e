//! Debugger expressions.
//!
//! The input is lexed into a flat token list and evaluated by recursive
//! splitting on the major operator of each token range. No tree is built.
//!
//! Grammar, loosest binding first:
//!
//! | level | operators            |
//! |-------|----------------------|
//! | 1     | `\|\|`               |
//! | 2     | `&&`                 |
//! | 3     | `==` `!=`            |
//! | 4     | `<` `>` `<=` `>=`    |
//! | 5     | `+` `-`              |
//! | 6     | `*` `/` `%`          |
//! | 7     | unary `-` `+` `*`    |
//!
//! Operands are decimal or `0x` hex literals and `$`-prefixed register
//! names. Comparisons are unsigned, division and remainder are signed.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ExprError;
use crate::vm::memory::Memory;
use crate::vm::registers::RegisterFile;
use crate::vm::{SWord, Word};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Num,
    Hex,
    Reg,
    LParen,
    RParen,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pos,
    Neg,
    Deref,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl TokenKind {
    fn is_operand(self) -> bool {
        matches!(self, TokenKind::Num | TokenKind::Hex | TokenKind::Reg)
    }

    fn is_unary(self) -> bool {
        matches!(self, TokenKind::Pos | TokenKind::Neg | TokenKind::Deref)
    }

    /// A following `+`, `-` or `*` is binary only after one of these.
    fn ends_operand(self) -> bool {
        self.is_operand() || self == TokenKind::RParen
    }

    fn precedence(self) -> Option<u8> {
        use TokenKind::*;
        Some(match self {
            Or => 1,
            And => 2,
            Eq | Ne => 3,
            Lt | Gt | Le | Ge => 4,
            Add | Sub => 5,
            Mul | Div | Rem => 6,
            Pos | Neg | Deref => 7,
            Num | Hex | Reg | LParen | RParen => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte offset of the token in the input.
    pub offset: usize,
}

/// Lexical rules, tried in order. `None` means skip.
static RULES: LazyLock<Vec<(Regex, Option<TokenKind>)>> = LazyLock::new(|| {
    use TokenKind::*;
    [
        (r"^\s+", None),
        (r"^0[xX][0-9a-fA-F]+", Some(Hex)),
        (r"^[0-9]+", Some(Num)),
        (r"^\$\w+", Some(Reg)),
        (r"^==", Some(Eq)),
        (r"^!=", Some(Ne)),
        (r"^<=", Some(Le)),
        (r"^>=", Some(Ge)),
        (r"^&&", Some(And)),
        (r"^\|\|", Some(Or)),
        (r"^<", Some(Lt)),
        (r"^>", Some(Gt)),
        (r"^\(", Some(LParen)),
        (r"^\)", Some(RParen)),
        (r"^\+", Some(Add)),
        (r"^-", Some(Sub)),
        (r"^\*", Some(Mul)),
        (r"^/", Some(Div)),
        (r"^%", Some(Rem)),
    ]
    .into_iter()
    .map(|(re, kind)| (Regex::new(re).expect("lexer rule must compile"), kind))
    .collect()
});

/// Splits `text` into tokens, deciding unary vs binary `+ - *` on the way.
pub fn tokenize(text: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut position = 0;
    while position < text.len() {
        let rest = &text[position..];
        let (len, kind) = RULES
            .iter()
            .find_map(|(re, kind)| re.find(rest).map(|m| (m.end(), *kind)))
            .ok_or(ExprError::Lex { offset: position })?;

        if let Some(mut kind) = kind {
            let binary = tokens.last().is_some_and(|t| t.kind.ends_operand());
            if !binary {
                kind = match kind {
                    TokenKind::Add => TokenKind::Pos,
                    TokenKind::Sub => TokenKind::Neg,
                    TokenKind::Mul => TokenKind::Deref,
                    other => other,
                };
            }
            tokens.push(Token {
                kind,
                text: rest[..len].to_string(),
                offset: position,
            });
        }
        position += len;
    }
    log::trace!("tokens: {tokens:?}");
    Ok(tokens)
}

/// Evaluates `text` against the current machine state.
pub fn evaluate(text: &str, regs: &RegisterFile, mem: &Memory) -> Result<Word, ExprError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }
    let eval = Evaluator {
        tokens: &tokens,
        end: text.len(),
        regs,
        mem,
    };
    eval.eval(0, tokens.len() - 1)
}

struct Evaluator<'a> {
    tokens: &'a [Token],
    end: usize,
    regs: &'a RegisterFile,
    mem: &'a Memory,
}

impl Evaluator<'_> {
    fn syntax(&self, index: usize) -> ExprError {
        let offset = self.tokens.get(index).map_or(self.end, |t| t.offset);
        ExprError::Syntax { offset }
    }

    /// Evaluates the inclusive token range `p..=q`.
    fn eval(&self, p: usize, q: usize) -> Result<Word, ExprError> {
        if p > q {
            return Err(self.syntax(p));
        }
        if p == q {
            return self.operand(p);
        }
        if self.check_parentheses(p, q) {
            return self.eval(p + 1, q - 1);
        }

        let major = self.find_major(p, q)?;
        let op = self.tokens[major].kind;
        if op.is_unary() {
            if major != p {
                return Err(self.syntax(major));
            }
            let val = self.eval(p + 1, q)?;
            return self.unary(op, val);
        }
        if major == p {
            return Err(self.syntax(major));
        }
        let lhs = self.eval(p, major - 1)?;
        let rhs = self.eval(major + 1, q)?;
        binary(op, lhs, rhs)
    }

    fn operand(&self, i: usize) -> Result<Word, ExprError> {
        let token = &self.tokens[i];
        let overflow = ExprError::Overflow {
            offset: token.offset,
        };
        match token.kind {
            TokenKind::Num => token.text.parse().map_err(|_| overflow),
            TokenKind::Hex => Word::from_str_radix(&token.text[2..], 16).map_err(|_| overflow),
            TokenKind::Reg => self
                .regs
                .lookup(&token.text)
                .ok_or_else(|| ExprError::UnknownRegister(token.text.clone())),
            _ => Err(self.syntax(i)),
        }
    }

    /// True when `p` and `q` are a matching pair enclosing the whole range.
    fn check_parentheses(&self, p: usize, q: usize) -> bool {
        if self.tokens[p].kind != TokenKind::LParen || self.tokens[q].kind != TokenKind::RParen {
            return false;
        }
        let mut depth = 0usize;
        for i in p..=q {
            match self.tokens[i].kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth -= 1,
                _ => {}
            }
            if depth == 0 {
                return i == q;
            }
        }
        false
    }

    /// Index of the loosest-binding operator outside any parentheses.
    /// Binary ties go to the rightmost, unary ties to the leftmost.
    fn find_major(&self, p: usize, q: usize) -> Result<usize, ExprError> {
        let mut depth = 0usize;
        let mut major: Option<(usize, u8)> = None;
        for i in p..=q {
            let kind = self.tokens[i].kind;
            match kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth = depth.checked_sub(1).ok_or_else(|| self.syntax(i))?;
                }
                _ if depth > 0 => {}
                _ => {
                    let Some(prec) = kind.precedence() else {
                        continue;
                    };
                    let better = match major {
                        None => true,
                        Some((_, best)) => {
                            prec < best || (prec == best && !kind.is_unary())
                        }
                    };
                    if better {
                        major = Some((i, prec));
                    }
                }
            }
        }
        if depth != 0 {
            return Err(self.syntax(p));
        }
        major.map(|(i, _)| i).ok_or_else(|| self.syntax(p))
    }

    fn unary(&self, op: TokenKind, val: Word) -> Result<Word, ExprError> {
        Ok(match op {
            TokenKind::Neg => val.wrapping_neg(),
            TokenKind::Pos => val,
            TokenKind::Deref => self.mem.read(val, 4)? as Word,
            _ => unreachable!("not a unary operator: {op:?}"),
        })
    }
}

fn binary(op: TokenKind, lhs: Word, rhs: Word) -> Result<Word, ExprError> {
    use TokenKind::*;
    Ok(match op {
        Add => lhs.wrapping_add(rhs),
        Sub => lhs.wrapping_sub(rhs),
        Mul => lhs.wrapping_mul(rhs),
        Div | Rem if rhs == 0 => return Err(ExprError::DivideByZero),
        Div => (lhs as SWord).wrapping_div(rhs as SWord) as Word,
        Rem => (lhs as SWord).wrapping_rem(rhs as SWord) as Word,
        Eq => (lhs == rhs) as Word,
        Ne => (lhs != rhs) as Word,
        Lt => (lhs < rhs) as Word,
        Gt => (lhs > rhs) as Word,
        Le => (lhs <= rhs) as Word,
        Ge => (lhs >= rhs) as Word,
        And => (lhs != 0 && rhs != 0) as Word,
        Or => (lhs != 0 || rhs != 0) as Word,
        _ => unreachable!("not a binary operator: {op:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Word = 0x8000_0000;

    fn state() -> (RegisterFile, Memory) {
        let mut regs = RegisterFile::new(32, BASE);
        regs.set(2, BASE + 0x10);
        regs.set(10, 7);
        let mut mem = Memory::new(BASE, 0x100);
        mem.write(BASE + 0x10, 4, 0xdead_beef).unwrap();
        (regs, mem)
    }

    fn eval(text: &str) -> Result<Word, ExprError> {
        let (regs, mem) = state();
        evaluate(text, &regs, &mem)
    }

    #[test]
    fn test_precedence() {
        assert_eq!(Ok(14), eval("2 + 3 * 4"));
        assert_eq!(Ok(20), eval("(2 + 3) * 4"));
        assert_eq!(Ok(1), eval("1 + 2 == 3"));
        assert_eq!(Ok(1), eval("0 || 1 && 1"));
        assert_eq!(Ok(0), eval("2 < 1 + 0"));
    }

    #[test]
    fn test_left_associative() {
        assert_eq!(Ok(5), eval("10 - 3 - 2"));
        assert_eq!(Ok(2), eval("16 / 4 / 2"));
        assert_eq!(Ok(2), eval("(1 + 2) - (3 - 2)"));
    }

    #[test]
    fn test_unary_or_binary() {
        assert_eq!(Ok(1), eval("-3 + 4"));
        assert_eq!(Ok(2), eval("5 - 3"));
        assert_eq!(Ok(-6i32 as Word), eval("2 * -3"));
        assert_eq!(Ok(3), eval("- -3"));
        assert_eq!(Ok(4), eval("+4"));
        assert_eq!(Ok(-5i32 as Word), eval("-(2 + 3)"));

        let kinds: Vec<_> = tokenize("-1 - -1").unwrap().iter().map(|t| t.kind).collect();
        assert_eq!(
            vec![
                TokenKind::Neg,
                TokenKind::Num,
                TokenKind::Sub,
                TokenKind::Neg,
                TokenKind::Num
            ],
            kinds
        );
    }

    #[test]
    fn test_literals_and_registers() {
        assert_eq!(Ok(0x80000010), eval("0x80000010"));
        assert_eq!(Ok(255), eval("0XfF"));
        assert_eq!(Ok(7), eval("$a0"));
        assert_eq!(Ok(BASE), eval("$pc"));
        assert_eq!(Ok(0), eval("$0"));
        assert_eq!(Ok(8), eval("$a0 + 1"));
        assert_eq!(Err(ExprError::UnknownRegister("$q7".into())), eval("$q7"));
        assert_eq!(Err(ExprError::Overflow { offset: 0 }), eval("4294967296"));
    }

    #[test]
    fn test_dereference() {
        assert_eq!(Ok(0xdead_beef), eval("*$sp"));
        assert_eq!(Ok(0xdead_beef), eval("*0x80000010"));
        assert_eq!(Ok(0xdead_bef0), eval("*$sp + 1"));
        assert_eq!(Ok(0x00de_adbe), eval("*($sp + 1)"));
        assert!(matches!(eval("*0"), Err(ExprError::Memory(_))));
    }

    #[test]
    fn test_division() {
        assert_eq!(Err(ExprError::DivideByZero), eval("1 / 0"));
        assert_eq!(Err(ExprError::DivideByZero), eval("1 % (2 - 2)"));
        assert_eq!(Ok(-3i32 as Word), eval("-7 / 2"));
        assert_eq!(Ok(1), eval("7 % 3"));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(Ok(1), eval("1 != 2"));
        assert_eq!(Ok(1), eval("2 <= 2"));
        assert_eq!(Ok(0), eval("1 >= 2"));
        // unsigned
        assert_eq!(Ok(1), eval("-1 > 1"));
    }

    #[test]
    fn test_idempotent() {
        let (regs, mem) = state();
        let text = "*$sp - ($a0 * 3) / 2";
        assert_eq!(evaluate(text, &regs, &mem), evaluate(text, &regs, &mem));
    }

    #[test]
    fn test_lex_failure_offset() {
        assert_eq!(Err(ExprError::Lex { offset: 4 }), eval("1 + @"));
        assert_eq!(Err(ExprError::Lex { offset: 0 }), eval("abc"));
    }

    #[test]
    fn test_bad_expressions() {
        assert_eq!(Err(ExprError::Empty), eval(""));
        assert_eq!(Err(ExprError::Empty), eval("   "));
        assert_eq!(Err(ExprError::Syntax { offset: 3 }), eval("3 -"));
        assert!(matches!(eval("(1 + 2"), Err(ExprError::Syntax { .. })));
        assert!(matches!(eval("1 + 2)"), Err(ExprError::Syntax { .. })));
        assert!(matches!(eval("()"), Err(ExprError::Syntax { .. })));
        assert!(matches!(eval("1 2"), Err(ExprError::Syntax { .. })));
        assert!(matches!(eval("* 1 2"), Err(ExprError::Syntax { .. })));
        assert!(matches!(eval("== 1"), Err(ExprError::Syntax { .. })));
    }

    #[test]
    fn test_outer_parentheses_not_mistaken() {
        assert_eq!(Ok(21), eval("(1 + 2) * (3 + 4)"));
        assert_eq!(Ok(10), eval("((1 + 2) + (3 + 4))"));
    }
}
