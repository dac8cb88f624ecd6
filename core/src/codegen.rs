use derive_more::Display;

use crate::config::RuntimeNames;
use crate::format::ArgType;
use crate::ir::{BinOp, CastKind, Expr, Function, Param, Stmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Half {
    #[display("first")]
    First,
    #[display("second")]
    Second,
}

/// Position of the 4-bit length selector of a primitive argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NibbleSlot {
    pub byte: usize,
    pub half: Half,
}

impl NibbleSlot {
    fn nth(n: usize) -> Self {
        let half = if n % 2 == 0 { Half::First } else { Half::Second };
        Self { byte: n / 2, half }
    }

    fn expr(self) -> Expr {
        Expr::ident("nib").index(self.byte).member(&self.half.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgClass {
    /// Copied by value and compressed through its nibble slot.
    Primitive(NibbleSlot),
    /// Copied by content, never compressed.
    String,
}

/// Binary layout of the dynamic arguments of a log statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgLayout {
    args: Vec<(ArgType, ArgClass)>,
    nibble_bytes: usize,
}

impl ArgLayout {
    pub fn new(types: &[ArgType]) -> Self {
        let mut primitives = 0;
        let args = types
            .iter()
            .map(|&ty| {
                if ty.is_string() {
                    (ty, ArgClass::String)
                } else {
                    let slot = NibbleSlot::nth(primitives);
                    primitives += 1;
                    (ty, ArgClass::Primitive(slot))
                }
            })
            .collect();

        Self {
            args,
            nibble_bytes: primitives.div_ceil(2),
        }
    }

    /// Number of bytes taken by the packed length selectors.
    #[inline]
    pub fn nibble_bytes(&self) -> usize {
        self.nibble_bytes
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn primitives(&self) -> impl Iterator<Item = (usize, ArgType, NibbleSlot)> + '_ {
        self.args.iter().enumerate().filter_map(|(i, &(ty, class))| match class {
            ArgClass::Primitive(slot) => Some((i, ty, slot)),
            ArgClass::String => None,
        })
    }

    pub fn strings(&self) -> impl Iterator<Item = (usize, ArgType)> + '_ {
        self.args
            .iter()
            .enumerate()
            .filter(|(_, (_, class))| *class == ArgClass::String)
            .map(|(i, &(ty, _))| (i, ty))
    }

    /// Parameters of the record function, the format string first.
    pub fn parameters(&self) -> Vec<Param> {
        let args = self
            .args
            .iter()
            .enumerate()
            .map(|(i, (ty, _))| Param::new(ty.to_string(), arg(i)));
        [Param::new("const char*", "fmtStr")].into_iter().chain(args).collect()
    }

    /// The parameter list of the record function without the format string.
    pub fn signature(&self) -> String {
        self.parameters()
            .iter()
            .skip(1)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// What the generated functions are specialized for.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub format: &'a str,
    pub symbol: &'a str,
    pub filename: &'a str,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCode {
    pub record: Function,
    pub compress: Function,
    pub decompress: Function,
}

pub fn record_fn_name(symbol: &str) -> String {
    format!("__lw_record{symbol}")
}

pub fn compress_fn_name(symbol: &str) -> String {
    format!("compressArgs{symbol}")
}

pub fn decompress_fn_name(symbol: &str) -> String {
    format!("decompressPrintArgs{symbol}")
}

pub fn id_name(symbol: &str) -> String {
    format!("__lw_id{symbol}")
}

pub fn generate(runtime: &RuntimeNames, layout: &ArgLayout, target: &Target<'_>) -> LogCode {
    LogCode {
        record: record(runtime, layout, target),
        compress: compress(runtime, layout, target),
        decompress: decompress(runtime, layout, target),
    }
}

fn record(runtime: &RuntimeNames, layout: &ArgLayout, target: &Target<'_>) -> Function {
    let mut body = vec![];

    for (i, ty) in layout.strings() {
        let len = if ty.is_wide_string() {
            Expr::call("wcslen", vec![Expr::ident(arg(i))])
                .binary(BinOp::Add, Expr::Int(1))
                .paren()
                .binary(BinOp::Mul, Expr::size_of_type("wchar_t"))
        } else {
            Expr::call("strlen", vec![Expr::ident(arg(i))]).binary(BinOp::Add, Expr::Int(1))
        };
        body.push(Stmt::local("size_t", str_len(i), len));
    }

    let sizes = layout
        .primitives()
        .map(|(i, _, _)| Expr::size_of(Expr::ident(arg(i))))
        .chain(layout.strings().map(|(i, _)| Expr::ident(str_len(i))))
        .chain([Expr::size_of_type(&runtime.entry)]);
    if let Some(total) = Expr::chain(BinOp::Add, sizes) {
        body.push(Stmt::local("size_t", "allocSize", total));
    }

    let entry_ptr = format!("{}*", runtime.entry);
    let alloc = Expr::call(&runtime.reserve_alloc, vec![Expr::ident("allocSize")]);
    body.push(Stmt::local(&entry_ptr, "re", Expr::cast(CastKind::Reinterpret, &entry_ptr, alloc)));
    body.push(Stmt::If {
        cond: Expr::ident("re").binary(BinOp::Eq, Expr::raw("nullptr")),
        then: vec![Stmt::Return(None)],
    });
    body.push(Stmt::Blank);

    let re = || Expr::ident("re");
    body.extend([
        Stmt::Assign(re().arrow("fmtId"), Expr::ident(id_name(target.symbol))),
        Stmt::Assign(re().arrow("timestamp"), Expr::call(&runtime.timestamp, vec![])),
        Stmt::Assign(
            re().arrow("entrySize"),
            Expr::cast(CastKind::Static, "uint32_t", Expr::ident("allocSize")),
        ),
        Stmt::Assign(re().arrow("argMetaBytes"), Expr::Int(layout.nibble_bytes())),
        Stmt::Blank,
        Stmt::local("char*", "buffer", re().arrow("argData")),
    ]);

    for (i, _, _) in layout.primitives() {
        body.push(Stmt::Expr(Expr::call(&runtime.record_primitive, vec![
            Expr::ident("buffer"),
            Expr::ident(arg(i)),
        ])));
    }
    for (i, _) in layout.strings() {
        body.push(Stmt::Expr(Expr::call("memcpy", vec![
            Expr::ident("buffer"),
            Expr::ident(arg(i)),
            Expr::ident(str_len(i)),
        ])));
        body.push(Stmt::AddAssign(Expr::ident("buffer"), Expr::ident(str_len(i))));
    }

    body.push(Stmt::Blank);
    body.push(Stmt::Expr(Expr::call(&runtime.finish_alloc, vec![Expr::ident("allocSize")])));

    Function {
        inline: false,
        ret: "void".to_owned(),
        name: record_fn_name(target.symbol),
        params: layout.parameters(),
        body,
    }
}

fn compress(runtime: &RuntimeNames, layout: &ArgLayout, target: &Target<'_>) -> Function {
    let mut body = vec![Stmt::local("char*", "originalOutPtr", Expr::ident("out"))];

    if layout.nibble_bytes() > 0 {
        let nibble_ptr = format!("{}*", runtime.nibble);
        body.push(Stmt::local(
            &nibble_ptr,
            "nib",
            Expr::cast(CastKind::Reinterpret, &nibble_ptr, Expr::ident("out")),
        ));
        body.push(Stmt::AddAssign(Expr::ident("out"), Expr::Int(layout.nibble_bytes())));
    }
    body.push(Stmt::local("char*", "args", Expr::ident("re").arrow("argData")));
    body.push(Stmt::Blank);

    for (i, ty, _) in layout.primitives() {
        let ptr = Expr::cast(CastKind::Reinterpret, format!("{ty}*"), Expr::ident("args"));
        body.push(Stmt::local(ty.to_string(), arg(i), ptr.deref()));
        body.push(Stmt::AddAssign(Expr::ident("args"), Expr::size_of(Expr::ident(arg(i)))));
    }

    for (i, _, slot) in layout.primitives() {
        let packed = Expr::call(&runtime.pack, vec![Expr::ident("out").addr_of(), Expr::ident(arg(i))]);
        let selector = Expr::raw("0x0f").binary(BinOp::BitAnd, Expr::cast(CastKind::Static, "uint8_t", packed));
        body.push(Stmt::Assign(slot.expr(), selector));
    }

    if layout.strings().next().is_some() {
        let sizes = layout
            .primitives()
            .map(|(i, _, _)| Expr::size_of(Expr::ident(arg(i))))
            .chain([Expr::size_of_type(&runtime.entry)]);
        let total = [Expr::ident("re").arrow("entrySize")].into_iter().chain(sizes);
        if let Some(remaining) = Expr::chain(BinOp::Sub, total) {
            body.push(Stmt::Blank);
            body.push(Stmt::local("size_t", "stringBytes", remaining));
        }
        body.push(Stmt::Expr(Expr::call("memcpy", vec![
            Expr::ident("out"),
            Expr::ident("args"),
            Expr::ident("stringBytes"),
        ])));
        body.push(Stmt::AddAssign(Expr::ident("out"), Expr::ident("stringBytes")));
    }

    body.push(Stmt::Return(Some(
        Expr::ident("out").binary(BinOp::Sub, Expr::ident("originalOutPtr")),
    )));

    Function {
        inline: true,
        ret: "ssize_t".to_owned(),
        name: compress_fn_name(target.symbol),
        params: vec![
            Param::new(format!("{}*", runtime.entry), "re"),
            Param::new("char*", "out"),
        ],
        body,
    }
}

fn decompress(runtime: &RuntimeNames, layout: &ArgLayout, target: &Target<'_>) -> Function {
    let mut body = vec![];

    if layout.nibble_bytes() > 0 {
        body.push(Stmt::declare(&runtime.nibble, format!("nib[{}]", layout.nibble_bytes())));
        body.push(Stmt::Expr(Expr::ident("in").method("read", vec![
            Expr::cast(CastKind::Reinterpret, "char*", Expr::ident("nib").addr_of()),
            Expr::Int(layout.nibble_bytes()),
        ])));
        body.push(Stmt::Blank);
    }

    for (i, ty, slot) in layout.primitives() {
        let value = Expr::template(&runtime.unpack, vec![ty.to_string()], vec![Expr::ident("in"), slot.expr()]);
        body.push(Stmt::local(ty.to_string(), arg(i), value));
    }

    for (i, ty) in layout.strings() {
        let buf = format!("{}_str", arg(i));
        if ty.is_wide_string() {
            let ch = format!("{}_ch", arg(i));
            body.push(Stmt::declare("std::wstring", &buf));
            body.push(Stmt::declare("wchar_t", &ch));
            let read = Expr::ident("in").method("read", vec![
                Expr::cast(CastKind::Reinterpret, "char*", Expr::ident(&ch).addr_of()),
                Expr::size_of_type("wchar_t"),
            ]);
            body.push(Stmt::While {
                cond: read.binary(BinOp::And, Expr::ident(&ch).binary(BinOp::Ne, Expr::raw(r"L'\0'"))),
                body: vec![Stmt::Expr(Expr::ident(&buf).method("push_back", vec![Expr::ident(&ch)]))],
            });
        } else {
            body.push(Stmt::declare("std::string", &buf));
            body.push(Stmt::Expr(Expr::call("std::getline", vec![
                Expr::ident("in"),
                Expr::ident(&buf),
                Expr::raw(r"'\0'"),
            ])));
        }
        body.push(Stmt::local(ty.to_string(), arg(i), Expr::ident(&buf).method("c_str", vec![])));
    }

    body.push(Stmt::Blank);
    body.push(Stmt::local("const char*", "filename", Expr::str(target.filename)));
    body.push(Stmt::local("const int", "linenum", Expr::Int(target.line as usize)));
    body.push(Stmt::Expr(Expr::call("printf", vec![
        Expr::str("%s:%d: "),
        Expr::ident("filename"),
        Expr::ident("linenum"),
    ])));

    let format = Expr::Concat(vec![Expr::str(target.format), Expr::str(r"\r\n")]);
    let args = [format].into_iter().chain((0..layout.arity()).map(|i| Expr::ident(arg(i))));
    body.push(Stmt::Expr(Expr::call("printf", args.collect())));

    Function {
        inline: true,
        ret: "void".to_owned(),
        name: decompress_fn_name(target.symbol),
        params: vec![Param::new("std::ifstream&", "in")],
        body,
    }
}

#[inline]
fn arg(i: usize) -> String {
    format!("arg{i}")
}

#[inline]
fn str_len(i: usize) -> String {
    format!("str{i}Len")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::format::argument_types;

    fn target(format: &str) -> Target<'_> {
        Target {
            format,
            symbol: "_hello",
            filename: "main.cc",
            line: 12,
        }
    }

    #[test]
    fn pack_two_selectors_per_byte() {
        let layout = ArgLayout::new(&argument_types("%d %s %lu %f %ls").unwrap());
        assert_eq!(layout.nibble_bytes(), 2);
        assert_eq!(layout.arity(), 5);

        let primitives: Vec<_> = layout.primitives().map(|(i, _, slot)| (i, slot)).collect();
        assert_eq!(primitives, [
            (0, NibbleSlot { byte: 0, half: Half::First }),
            (2, NibbleSlot { byte: 0, half: Half::Second }),
            (3, NibbleSlot { byte: 1, half: Half::First }),
        ]);
        let strings: Vec<_> = layout.strings().collect();
        assert_eq!(strings, [(1, ArgType::CharPtr), (4, ArgType::WCharPtr)]);

        assert_eq!(ArgLayout::new(&[]).nibble_bytes(), 0);
        assert_eq!(ArgLayout::new(&[ArgType::CharPtr]).nibble_bytes(), 0);
        assert_eq!(ArgLayout::new(&[ArgType::Int; 4]).nibble_bytes(), 2);
    }

    #[test]
    fn render_record_signature() {
        let layout = ArgLayout::new(&argument_types("%d %s").unwrap());
        assert_eq!(layout.signature(), "int arg0, const char* arg1");
        assert_eq!(ArgLayout::new(&[]).signature(), "");

        let code = generate(&RuntimeNames::default(), &layout, &target("%d %s"));
        assert_eq!(
            code.record.signature(),
            "void __lw_record_hello(const char* fmtStr, int arg0, const char* arg1)"
        );
    }

    #[test]
    fn generate_mixed_arguments() {
        let layout = ArgLayout::new(&argument_types("Hello %d %s").unwrap());
        let code = generate(&RuntimeNames::default(), &layout, &target("Hello %d %s"));

        assert_eq!(
            code.record.to_string(),
            r#"void __lw_record_hello(const char* fmtStr, int arg0, const char* arg1) {
    size_t str1Len = strlen(arg1) + 1;
    size_t allocSize = sizeof(arg0) + str1Len + sizeof(BufferUtils::UncompressedLogEntry);
    BufferUtils::UncompressedLogEntry* re = reinterpret_cast<BufferUtils::UncompressedLogEntry*>(NanoLog::__internal_reserveAlloc(allocSize));
    if (re == nullptr) {
        return;
    }

    re->fmtId = __lw_id_hello;
    re->timestamp = PerfUtils::Cycles::rdtsc();
    re->entrySize = static_cast<uint32_t>(allocSize);
    re->argMetaBytes = 1;

    char* buffer = re->argData;
    BufferUtils::recordPrimitive(buffer, arg0);
    memcpy(buffer, arg1, str1Len);
    buffer += str1Len;

    NanoLog::__internal_finishAlloc(allocSize);
}
"#
        );

        assert_eq!(
            code.compress.to_string(),
            r#"inline ssize_t compressArgs_hello(BufferUtils::UncompressedLogEntry* re, char* out) {
    char* originalOutPtr = out;
    BufferUtils::TwoNibbles* nib = reinterpret_cast<BufferUtils::TwoNibbles*>(out);
    out += 1;
    char* args = re->argData;

    int arg0 = *reinterpret_cast<int*>(args);
    args += sizeof(arg0);
    nib[0].first = 0x0f & static_cast<uint8_t>(BufferUtils::pack(&out, arg0));

    size_t stringBytes = re->entrySize - sizeof(arg0) - sizeof(BufferUtils::UncompressedLogEntry);
    memcpy(out, args, stringBytes);
    out += stringBytes;
    return out - originalOutPtr;
}
"#
        );

        assert_eq!(
            code.decompress.to_string(),
            r#"inline void decompressPrintArgs_hello(std::ifstream& in) {
    BufferUtils::TwoNibbles nib[1];
    in.read(reinterpret_cast<char*>(&nib), 1);

    int arg0 = BufferUtils::unpack<int>(in, nib[0].first);
    std::string arg1_str;
    std::getline(in, arg1_str, '\0');
    const char* arg1 = arg1_str.c_str();

    const char* filename = "main.cc";
    const int linenum = 12;
    printf("%s:%d: ", filename, linenum);
    printf("Hello %d %s" "\r\n", arg0, arg1);
}
"#
        );
    }

    #[test]
    fn generate_without_arguments() {
        let layout = ArgLayout::new(&[]);
        let code = generate(&RuntimeNames::default(), &layout, &target("Hi"));

        let record = code.record.to_string();
        assert!(record.contains("size_t allocSize = sizeof(BufferUtils::UncompressedLogEntry);"));
        assert!(record.contains("re->argMetaBytes = 0;"));
        assert!(!record.contains("recordPrimitive"));

        assert_eq!(
            code.compress.to_string(),
            r#"inline ssize_t compressArgs_hello(BufferUtils::UncompressedLogEntry* re, char* out) {
    char* originalOutPtr = out;
    char* args = re->argData;

    return out - originalOutPtr;
}
"#
        );

        let decompress = code.decompress.to_string();
        assert!(!decompress.contains("nib"));
        assert!(decompress.contains(r#"printf("Hi" "\r\n");"#));
    }

    #[test]
    fn generate_wide_strings() {
        let layout = ArgLayout::new(&argument_types("%ls").unwrap());
        let code = generate(&RuntimeNames::default(), &layout, &target("%ls"));

        let record = code.record.to_string();
        assert!(record.contains("size_t str0Len = (wcslen(arg0) + 1) * sizeof(wchar_t);"));

        let decompress = code.decompress.to_string();
        assert!(decompress.contains(
            r"while (in.read(reinterpret_cast<char*>(&arg0_ch), sizeof(wchar_t)) && arg0_ch != L'\0') {"
        ));
        assert!(decompress.contains("const wchar_t* arg0 = arg0_str.c_str();"));
    }

    #[test]
    fn star_arguments_get_their_own_slots() {
        let layout = ArgLayout::new(&argument_types("%*.*f").unwrap());
        assert_eq!(layout.nibble_bytes(), 2);

        let code = generate(&RuntimeNames::default(), &layout, &target("%*.*f"));
        let compress = code.compress.to_string();
        assert!(compress.contains("nib[1].first = 0x0f & static_cast<uint8_t>(BufferUtils::pack(&out, arg2));"));
        assert!(code.decompress.to_string().contains("double arg2 = BufferUtils::unpack<double>(in, nib[1].first);"));
    }
}
