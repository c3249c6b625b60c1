//! The `${{ }}` condition grammar (§4.4), parsed with `combine` the way
//! `maelstrom-container`'s `image_name` module parses Docker references.
//!
//! ```text
//! condition   := '${{' expr '}}'
//! expr        := cmp (('and'|'or') cmp)*
//! cmp         := ref ('=='|'!=') "'" literal "'"
//! ref         := 'jobs.' name '.status' | 'env.' name
//! ```
//!
//! `and` binds tighter than `or`; there are no function calls, no arithmetic,
//! no nesting — this is a whitelist grammar, not a general expression
//! language.

use combine::parser::char::{char, spaces, string};
use combine::{attempt, choice, many1, satisfy, sep_by1, EasyParser, Parser, Stream};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq)]
pub enum Reference {
    JobStatus(String),
    Env(String),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Comparison {
    pub reference: Reference,
    pub op: CmpOp,
    pub literal: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Cmp(Comparison),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

/// Evaluation context the grammar is allowed to read from: current job
/// statuses (lowercased, `"unknown"` if absent) and the merged workflow env
/// (`""` if absent).
pub struct EvalContext<'a> {
    pub job_statuses: &'a HashMap<String, String>,
    pub env: &'a HashMap<String, String>,
}

impl Expr {
    pub fn eval(&self, ctx: &EvalContext) -> bool {
        match self {
            Expr::Cmp(cmp) => cmp.eval(ctx),
            Expr::And(parts) => parts.iter().all(|p| p.eval(ctx)),
            Expr::Or(parts) => parts.iter().any(|p| p.eval(ctx)),
        }
    }
}

impl Comparison {
    fn eval(&self, ctx: &EvalContext) -> bool {
        let actual = match &self.reference {
            Reference::JobStatus(name) => ctx.job_statuses.get(name).cloned().unwrap_or_else(|| "unknown".to_string()),
            Reference::Env(name) => ctx.env.get(name).cloned().unwrap_or_default(),
        };
        match self.op {
            CmpOp::Eq => actual == self.literal,
            CmpOp::Ne => actual != self.literal,
        }
    }
}

fn name<InputT: Stream<Token = char>>() -> impl Parser<InputT, Output = String> {
    many1(satisfy(|c: char| c.is_alphanumeric() || c == '_' || c == '-'))
}

fn reference<InputT: Stream<Token = char>>() -> impl Parser<InputT, Output = Reference> {
    choice((
        attempt(string("jobs.").with(name()).skip(string(".status"))).map(Reference::JobStatus),
        string("env.").with(name()).map(Reference::Env),
    ))
}

fn literal<InputT: Stream<Token = char>>() -> impl Parser<InputT, Output = String> {
    char('\'').with(many1(satisfy(|c| c != '\''))).skip(char('\''))
}

fn cmp_op<InputT: Stream<Token = char>>() -> impl Parser<InputT, Output = CmpOp> {
    choice((string("==").map(|_| CmpOp::Eq), string("!=").map(|_| CmpOp::Ne)))
}

fn comparison<InputT: Stream<Token = char>>() -> impl Parser<InputT, Output = Expr> {
    (reference(), spaces().with(cmp_op()).skip(spaces()), literal())
        .map(|(reference, op, literal)| Expr::Cmp(Comparison { reference, op, literal }))
}

fn and_expr<InputT: Stream<Token = char>>() -> impl Parser<InputT, Output = Expr> {
    sep_by1(comparison(), attempt(spaces().skip(string("and")).skip(spaces()))).map(|mut parts: Vec<Expr>| {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::And(parts)
        }
    })
}

fn or_expr<InputT: Stream<Token = char>>() -> impl Parser<InputT, Output = Expr> {
    sep_by1(and_expr(), attempt(spaces().skip(string("or")).skip(spaces()))).map(|mut parts: Vec<Expr>| {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::Or(parts)
        }
    })
}

fn condition<InputT: Stream<Token = char>>() -> impl Parser<InputT, Output = Expr> {
    string("${{").skip(spaces()).with(or_expr()).skip(spaces()).skip(string("}}"))
}

pub fn parse(input: &str) -> Result<Expr, String> {
    condition()
        .skip(combine::eof())
        .easy_parse(combine::stream::position::Stream::new(input.trim()))
        .map(|(expr, _)| expr)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(job_statuses: &'a HashMap<String, String>, env: &'a HashMap<String, String>) -> EvalContext<'a> {
        EvalContext { job_statuses, env }
    }

    #[test]
    fn simple_equality_matches() {
        let expr = parse("${{ jobs.build.status == 'success' }}").unwrap();
        let mut statuses = HashMap::new();
        statuses.insert("build".to_string(), "success".to_string());
        assert!(expr.eval(&ctx(&statuses, &HashMap::new())));
    }

    #[test]
    fn missing_job_resolves_to_unknown() {
        let expr = parse("${{ jobs.build.status == 'unknown' }}").unwrap();
        assert!(expr.eval(&ctx(&HashMap::new(), &HashMap::new())));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        // a and b or c  ==  (a and b) or c
        let expr = parse("${{ env.a == 'x' and env.b == 'y' or env.c == 'z' }}").unwrap();
        let mut env = HashMap::new();
        env.insert("c".to_string(), "z".to_string());
        assert!(expr.eval(&ctx(&HashMap::new(), &env)));
    }

    #[test]
    fn not_equal_operator() {
        let expr = parse("${{ jobs.build.status != 'failed' }}").unwrap();
        let mut statuses = HashMap::new();
        statuses.insert("build".to_string(), "success".to_string());
        assert!(expr.eval(&ctx(&statuses, &HashMap::new())));
    }

    #[test]
    fn malformed_condition_is_rejected() {
        assert!(parse("${{ jobs.build.status = 'success' }}").is_err());
        assert!(parse("not-a-condition").is_err());
    }
}
