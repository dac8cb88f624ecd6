use std::fmt;

use derive_more::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CastKind {
    #[display("static_cast")]
    Static,
    #[display("reinterpret_cast")]
    Reinterpret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinOp {
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display("*")]
    Mul,
    #[display("&")]
    BitAnd,
    #[display("==")]
    Eq,
    #[display("!=")]
    Ne,
    #[display("&&")]
    And,
}

/// A C++ expression. Operators render without implicit parentheses, use `Paren` where needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Ident(String),
    Int(usize),
    /// A string literal whose contents are already escaped.
    Str(String),
    /// A literal written verbatim, such as `'\0'` or `0x0f`.
    Raw(String),
    Call(Box<Expr>, Vec<Expr>),
    Template(String, Vec<String>, Vec<Expr>),
    Cast(CastKind, String, Box<Expr>),
    SizeOf(Box<Expr>),
    SizeOfType(String),
    Member(Box<Expr>, String),
    Arrow(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    AddrOf(Box<Expr>),
    Deref(Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Paren(Box<Expr>),
    /// Adjacent string literals, joined by the compiler.
    Concat(Vec<Expr>),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn str(contents: impl Into<String>) -> Self {
        Expr::Str(contents.into())
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Expr::Raw(text.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call(Box::new(Expr::ident(name)), args)
    }

    pub fn method(self, name: &str, args: Vec<Expr>) -> Self {
        Expr::Call(Box::new(self.member(name)), args)
    }

    pub fn template(name: impl Into<String>, types: Vec<String>, args: Vec<Expr>) -> Self {
        Expr::Template(name.into(), types, args)
    }

    pub fn cast(kind: CastKind, ty: impl Into<String>, expr: Expr) -> Self {
        Expr::Cast(kind, ty.into(), Box::new(expr))
    }

    pub fn size_of(expr: Expr) -> Self {
        Expr::SizeOf(Box::new(expr))
    }

    pub fn size_of_type(ty: impl Into<String>) -> Self {
        Expr::SizeOfType(ty.into())
    }

    pub fn member(self, name: &str) -> Self {
        Expr::Member(Box::new(self), name.to_owned())
    }

    pub fn arrow(self, name: &str) -> Self {
        Expr::Arrow(Box::new(self), name.to_owned())
    }

    pub fn index(self, idx: usize) -> Self {
        Expr::Index(Box::new(self), Box::new(Expr::Int(idx)))
    }

    pub fn addr_of(self) -> Self {
        Expr::AddrOf(Box::new(self))
    }

    pub fn deref(self) -> Self {
        Expr::Deref(Box::new(self))
    }

    pub fn binary(self, op: BinOp, rhs: Expr) -> Self {
        Expr::Binary(Box::new(self), op, Box::new(rhs))
    }

    pub fn paren(self) -> Self {
        Expr::Paren(Box::new(self))
    }

    /// Folds the terms into a left-associative chain of `op`.
    pub fn chain(op: BinOp, terms: impl IntoIterator<Item = Expr>) -> Option<Self> {
        terms.into_iter().reduce(|lhs, rhs| lhs.binary(op, rhs))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident(name) | Expr::Raw(name) => f.write_str(name),
            Expr::Int(val) => write!(f, "{val}"),
            Expr::Str(contents) => write!(f, "\"{contents}\""),
            Expr::Call(fun, args) => write!(f, "{fun}({})", Separated(args, ", ")),
            Expr::Template(name, types, args) => {
                write!(f, "{name}<{}>({})", types.join(", "), Separated(args, ", "))
            }
            Expr::Cast(kind, ty, expr) => write!(f, "{kind}<{ty}>({expr})"),
            Expr::SizeOf(expr) => write!(f, "sizeof({expr})"),
            Expr::SizeOfType(ty) => write!(f, "sizeof({ty})"),
            Expr::Member(expr, name) => write!(f, "{expr}.{name}"),
            Expr::Arrow(expr, name) => write!(f, "{expr}->{name}"),
            Expr::Index(expr, idx) => write!(f, "{expr}[{idx}]"),
            Expr::AddrOf(expr) => write!(f, "&{expr}"),
            Expr::Deref(expr) => write!(f, "*{expr}"),
            Expr::Binary(lhs, op, rhs) => write!(f, "{lhs} {op} {rhs}"),
            Expr::Paren(expr) => write!(f, "({expr})"),
            Expr::Concat(parts) => write!(f, "{}", Separated(parts, " ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Local { ty: String, name: String, init: Option<Expr> },
    Assign(Expr, Expr),
    AddAssign(Expr, Expr),
    Expr(Expr),
    If { cond: Expr, then: Vec<Stmt> },
    While { cond: Expr, body: Vec<Stmt> },
    Return(Option<Expr>),
    Comment(String),
    Blank,
}

impl Stmt {
    pub fn local(ty: impl Into<String>, name: impl Into<String>, init: Expr) -> Self {
        Stmt::Local {
            ty: ty.into(),
            name: name.into(),
            init: Some(init),
        }
    }

    pub fn declare(ty: impl Into<String>, name: impl Into<String>) -> Self {
        Stmt::Local {
            ty: ty.into(),
            name: name.into(),
            init: None,
        }
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = Indent(depth);
        match self {
            Stmt::Local { ty, name, init: Some(init) } => writeln!(f, "{pad}{ty} {name} = {init};"),
            Stmt::Local { ty, name, init: None } => writeln!(f, "{pad}{ty} {name};"),
            Stmt::Assign(lhs, rhs) => writeln!(f, "{pad}{lhs} = {rhs};"),
            Stmt::AddAssign(lhs, rhs) => writeln!(f, "{pad}{lhs} += {rhs};"),
            Stmt::Expr(expr) => writeln!(f, "{pad}{expr};"),
            Stmt::If { cond, then } => {
                writeln!(f, "{pad}if ({cond}) {{")?;
                write_block(f, then, depth + 1)?;
                writeln!(f, "{pad}}}")
            }
            Stmt::While { cond, body } => {
                writeln!(f, "{pad}while ({cond}) {{")?;
                write_block(f, body, depth + 1)?;
                writeln!(f, "{pad}}}")
            }
            Stmt::Return(Some(expr)) => writeln!(f, "{pad}return {expr};"),
            Stmt::Return(None) => writeln!(f, "{pad}return;"),
            Stmt::Comment(text) => writeln!(f, "{pad}// {text}"),
            Stmt::Blank => writeln!(f),
        }
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, stmts: &[Stmt], depth: usize) -> fmt::Result {
    stmts.iter().try_for_each(|stmt| stmt.write(f, depth))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub ty: String,
    pub name: String,
}

impl Param {
    pub fn new(ty: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub inline: bool,
    pub ret: String,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

impl Function {
    /// The declarator without a body, e.g. `void name(const char* fmtStr, int arg0)`.
    pub fn signature(&self) -> String {
        format!("{} {}({})", self.ret, self.name, Separated(&self.params, ", "))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inline {
            f.write_str("inline ")?;
        }
        writeln!(f, "{} {{", self.signature())?;
        write_block(f, &self.body, 1)?;
        writeln!(f, "}}")
    }
}

/// A top-level declaration of a generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Directive(String),
    Comment(String),
    Blank,
    Function(Function),
    Const {
        ty: String,
        name: String,
        value: Option<Expr>,
        external: bool,
        comment: Option<String>,
    },
    Array {
        decl: String,
        elements: Vec<Expr>,
    },
    Namespace {
        name: Option<String>,
        items: Vec<Item>,
    },
    /// Previously rendered code, emitted as is.
    Verbatim(String),
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Directive(text) => writeln!(f, "#{text}"),
            Item::Comment(text) => writeln!(f, "// {text}"),
            Item::Blank => writeln!(f),
            Item::Function(fun) => write!(f, "{fun}"),
            Item::Const {
                ty,
                name,
                value,
                external,
                comment,
            } => {
                if *external {
                    f.write_str("extern ")?;
                }
                write!(f, "const {ty} {name}")?;
                if let Some(value) = value {
                    write!(f, " = {value}")?;
                }
                f.write_str(";")?;
                if let Some(comment) = comment {
                    write!(f, " // {comment}")?;
                }
                writeln!(f)
            }
            Item::Array { decl, elements } => {
                writeln!(f, "{decl} = {{")?;
                let pad = Indent(1);
                for (i, elem) in elements.iter().enumerate() {
                    let sep = if i + 1 < elements.len() { "," } else { "" };
                    writeln!(f, "{pad}{elem}{sep}")?;
                }
                writeln!(f, "}};")
            }
            Item::Namespace { name, items } => {
                match name {
                    Some(name) => writeln!(f, "namespace {name} {{")?,
                    None => writeln!(f, "namespace {{")?,
                }
                items.iter().try_for_each(|item| write!(f, "{item}"))?;
                match name {
                    Some(name) => writeln!(f, "}} // namespace {name}"),
                    None => writeln!(f, "}} // namespace"),
                }
            }
            Item::Verbatim(text) => {
                f.write_str(text)?;
                if !text.ends_with('\n') {
                    writeln!(f)?;
                }
                Ok(())
            }
        }
    }
}

/// Renders a whole translation unit.
pub fn render(items: &[Item]) -> String {
    items.iter().map(ToString::to_string).collect()
}

struct Indent(usize);

impl fmt::Display for Indent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (0..self.0).try_for_each(|_| f.write_str("    "))
    }
}

struct Separated<'a, A>(&'a [A], &'static str);

impl<A: fmt::Display> fmt::Display for Separated<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, elem) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(self.1)?;
            }
            write!(f, "{elem}")?;
        }
        Ok(())
    }
}
