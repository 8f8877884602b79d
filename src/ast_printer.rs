use crate::ast::{Expr, FunctionDecl, LiteralValue, Stmt};

/// Converts syntax trees to the Crafting‑Interpreters parenthesised prefix
/// form, e.g. `(+ 1.0 (group (* 2.0 3.0)))`.
pub struct AstPrinter;

fn number(n: f64) -> String {
    if n.fract() == 0.0 {
        // 3 → 3.0
        format!("{}.0", n)
    } else {
        n.to_string()
    }
}

fn parenthesize<I>(name: &str, parts: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut s = format!("({}", name);
    for part in parts {
        s.push(' ');
        s.push_str(&part);
    }
    s.push(')');
    s
}

impl AstPrinter {
    pub fn print(expr: &Expr) -> String {
        match expr {
            // ── literals ────────────────────────────────────────────────
            Expr::Literal(lit) => match lit {
                LiteralValue::True => "true".into(),
                LiteralValue::False => "false".into(),
                LiteralValue::Nil => "nil".into(),
                LiteralValue::Str(s) => s.clone(),
                LiteralValue::Number(n) => number(*n),
            },

            Expr::Grouping(inner) => format!("(group {})", Self::print(inner)),

            Expr::Unary { operator, right } => {
                format!("({} {})", operator.lexeme, Self::print(right))
            }

            Expr::Binary {
                left,
                operator,
                right,
            }
            | Expr::Logical {
                left,
                operator,
                right,
            } => format!(
                "({} {} {})",
                operator.lexeme,
                Self::print(left),
                Self::print(right)
            ),

            Expr::Variable { name, .. } => name.lexeme.clone(),

            Expr::Assign { name, value, .. } => {
                format!("(= {} {})", name.lexeme, Self::print(value))
            }

            Expr::Call {
                callee, arguments, ..
            } => parenthesize(
                "call",
                std::iter::once(Self::print(callee)).chain(arguments.iter().map(Self::print)),
            ),

            Expr::Function(declaration) => Self::function("fun", declaration),

            Expr::Get { object, name } => format!("(. {} {})", Self::print(object), name.lexeme),

            Expr::Set {
                object,
                name,
                value,
            } => format!(
                "(= (. {} {}) {})",
                Self::print(object),
                name.lexeme,
                Self::print(value)
            ),

            Expr::This { .. } => "this".into(),

            Expr::Super { method, .. } => format!("(super {})", method.lexeme),
        }
    }

    /// Prints one statement. Blocks and bodies nest inline.
    pub fn print_stmt(stmt: &Stmt) -> String {
        match stmt {
            Stmt::Expression(expr) => format!("(; {})", Self::print(expr)),

            Stmt::Print(expr) => format!("(print {})", Self::print(expr)),

            Stmt::Var { name, initializer } => match initializer {
                Some(expr) => format!("(var {} = {})", name.lexeme, Self::print(expr)),
                None => format!("(var {})", name.lexeme),
            },

            Stmt::Block(statements) => {
                parenthesize("block", statements.iter().map(Self::print_stmt))
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => match else_branch {
                Some(else_branch) => format!(
                    "(if-else {} {} {})",
                    Self::print(condition),
                    Self::print_stmt(then_branch),
                    Self::print_stmt(else_branch)
                ),
                None => format!(
                    "(if {} {})",
                    Self::print(condition),
                    Self::print_stmt(then_branch)
                ),
            },

            Stmt::While { condition, body } => format!(
                "(while {} {})",
                Self::print(condition),
                Self::print_stmt(body)
            ),

            Stmt::Function(declaration) => Self::function("fun", declaration),

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let mut head = format!("class {}", name.lexeme);
                if let Some(superclass) = superclass {
                    head.push_str(" < ");
                    head.push_str(&Self::print(superclass));
                }
                parenthesize(
                    &head,
                    methods.iter().map(|method| Self::function("method", method)),
                )
            }

            Stmt::Return { value, .. } => match value {
                Some(expr) => format!("(return {})", Self::print(expr)),
                None => "(return)".into(),
            },
        }
    }

    /// Prints a whole program, one top‑level statement per line.
    pub fn print_program(statements: &[Stmt]) -> String {
        statements
            .iter()
            .map(Self::print_stmt)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn function(kind: &str, declaration: &FunctionDecl) -> String {
        let params: Vec<&str> = declaration
            .params
            .iter()
            .map(|p| p.lexeme.as_str())
            .collect();

        let head = match declaration.name() {
            Some(name) => format!("{} {}({})", kind, name, params.join(" ")),
            None => format!("{} ({})", kind, params.join(" ")),
        };

        parenthesize(&head, declaration.body.iter().map(Self::print_stmt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::scan_all;

    fn expr(src: &str) -> String {
        let (tokens, _) = scan_all(src.as_bytes());
        AstPrinter::print(&Parser::new(&tokens).parse_expression().unwrap())
    }

    #[test]
    fn test_expression_forms() {
        assert_eq!(expr("1 + 2 * 3"), "(+ 1.0 (* 2.0 3.0))");
        assert_eq!(expr("-(4.5)"), "(- (group 4.5))");
        assert_eq!(expr("a or !b"), "(or a (! b))");
        assert_eq!(expr("f(1, \"s\")"), "(call f 1.0 s)");
        assert_eq!(expr("x.y = z"), "(= (. x y) z)");
    }

    #[test]
    fn test_for_loop_prints_desugared() {
        let (tokens, _) = scan_all(b"for (var i = 0; i < 2; i = i + 1) print i;");
        let program = Parser::new(&tokens).parse().unwrap();

        assert_eq!(
            AstPrinter::print_program(&program),
            "(block (var i = 0.0) (while (< i 2.0) (block (print i) (; (= i (+ i 1.0))))))"
        );
    }
}
