use std::ops::Range;

use derive_more::Display;
use enum_as_inner::EnumAsInner;

use crate::error::FormatError;

/// C type of a single dynamic log argument, as implied by a conversion specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ArgType {
    #[display("signed char")]
    SignedChar,
    #[display("unsigned char")]
    UnsignedChar,
    #[display("short int")]
    Short,
    #[display("unsigned short int")]
    UnsignedShort,
    #[display("int")]
    Int,
    #[display("unsigned int")]
    UnsignedInt,
    #[display("long int")]
    Long,
    #[display("unsigned long int")]
    UnsignedLong,
    #[display("long long int")]
    LongLong,
    #[display("unsigned long long int")]
    UnsignedLongLong,
    #[display("intmax_t")]
    IntMax,
    #[display("uintmax_t")]
    UIntMax,
    #[display("size_t")]
    Size,
    #[display("ptrdiff_t")]
    PtrDiff,
    #[display("double")]
    Double,
    #[display("long double")]
    LongDouble,
    #[display("wint_t")]
    WInt,
    #[display("const char*")]
    CharPtr,
    #[display("const wchar_t*")]
    WCharPtr,
    #[display("const void*")]
    VoidPtr,
}

impl ArgType {
    /// Strings are copied by content instead of by value.
    #[inline]
    pub fn is_string(self) -> bool {
        matches!(self, ArgType::CharPtr | ArgType::WCharPtr)
    }

    #[inline]
    pub fn is_wide_string(self) -> bool {
        self == ArgType::WCharPtr
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumAsInner)]
pub enum Width {
    Fixed(u32),
    /// Supplied by an extra `int` argument preceding the value.
    Star,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Char,
    Short,
    Long,
    LongLong,
    IntMax,
    Size,
    PtrDiff,
    LongDouble,
}

/// One piece of a format string. `ty` is `None` for literal text and escaped `%%`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpecifier {
    pub ty: Option<ArgType>,
    pub width: Option<Width>,
    pub precision: Option<Width>,
    pub text: String,
}

impl FormatSpecifier {
    /// Types of every argument this specifier consumes, in call order.
    pub fn argument_types(&self) -> impl Iterator<Item = ArgType> + '_ {
        let stars = [self.width, self.precision]
            .into_iter()
            .flatten()
            .filter(Width::is_star)
            .map(|_| ArgType::Int);
        stars.chain(self.ty)
    }
}

/// Splits a format string into literal text and conversion specifiers.
pub fn parse_specifiers(fmt: &str) -> Result<Vec<FormatSpecifier>, FormatError> {
    let segments = grammar::segments(fmt).map_err(|_| FormatError::Unrecognized(fmt.to_owned()))?;

    segments
        .into_iter()
        .map(|segment| match segment {
            Segment::Literal(span) => Ok(FormatSpecifier {
                ty: None,
                width: None,
                precision: None,
                text: fmt[span].to_owned(),
            }),
            Segment::Conversion(conv) => {
                let text = fmt[conv.span.clone()].to_owned();
                let ty = infer_type(conv.length, conv.conversion, &text)?;
                Ok(FormatSpecifier {
                    ty: Some(ty),
                    width: conv.width,
                    precision: conv.precision,
                    text,
                })
            }
        })
        .collect()
}

/// Returns the ordered types of the arguments expected after the format string.
pub fn argument_types(fmt: &str) -> Result<Vec<ArgType>, FormatError> {
    let specifiers = parse_specifiers(fmt)?;
    Ok(specifiers.iter().flat_map(FormatSpecifier::argument_types).collect())
}

fn infer_type(length: Option<Length>, conversion: Option<char>, text: &str) -> Result<ArgType, FormatError> {
    let invalid = || FormatError::InvalidLength(text.to_owned());

    let ty = match conversion.ok_or_else(|| FormatError::Unrecognized(text.to_owned()))? {
        'n' => return Err(FormatError::Unsupported(text.to_owned())),
        'd' | 'i' => match length {
            None => ArgType::Int,
            Some(Length::Char) => ArgType::SignedChar,
            Some(Length::Short) => ArgType::Short,
            Some(Length::Long) => ArgType::Long,
            Some(Length::LongLong) => ArgType::LongLong,
            Some(Length::IntMax) => ArgType::IntMax,
            Some(Length::Size) => ArgType::Size,
            Some(Length::PtrDiff) => ArgType::PtrDiff,
            Some(Length::LongDouble) => return Err(invalid()),
        },
        'u' | 'o' | 'x' | 'X' => match length {
            None => ArgType::UnsignedInt,
            Some(Length::Char) => ArgType::UnsignedChar,
            Some(Length::Short) => ArgType::UnsignedShort,
            Some(Length::Long) => ArgType::UnsignedLong,
            Some(Length::LongLong) => ArgType::UnsignedLongLong,
            Some(Length::IntMax) => ArgType::UIntMax,
            Some(Length::Size) => ArgType::Size,
            Some(Length::PtrDiff) => ArgType::PtrDiff,
            Some(Length::LongDouble) => return Err(invalid()),
        },
        'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'a' | 'A' => match length {
            None | Some(Length::Long | Length::LongLong) => ArgType::Double,
            Some(Length::LongDouble) => ArgType::LongDouble,
            Some(_) => return Err(invalid()),
        },
        'c' => match length {
            None => ArgType::Int,
            Some(Length::Long) => ArgType::WInt,
            Some(_) => return Err(invalid()),
        },
        's' => match length {
            None => ArgType::CharPtr,
            Some(Length::Long) => ArgType::WCharPtr,
            Some(_) => return Err(invalid()),
        },
        'p' => match length {
            None => ArgType::VoidPtr,
            Some(_) => return Err(invalid()),
        },
        _ => return Err(FormatError::Unrecognized(text.to_owned())),
    };
    Ok(ty)
}

#[derive(Debug)]
enum Segment {
    Literal(Range<usize>),
    Conversion(RawConversion),
}

#[derive(Debug)]
struct RawConversion {
    span: Range<usize>,
    width: Option<Width>,
    precision: Option<Width>,
    length: Option<Length>,
    conversion: Option<char>,
}

peg::parser! {
    grammar grammar() for str {
        rule number() -> u32
            = n:$(['0'..='9']+) {? n.parse().or(Err("u32")) }
        rule flags()
            = ['-' | '+' | ' ' | '#' | '0']*
        rule width() -> Width
            = "*" { Width::Star }
            / n:number() { Width::Fixed(n) }
        rule precision() -> Width
            = "." w:width()? { w.unwrap_or(Width::Fixed(0)) }
        rule length() -> Length
            = "hh" { Length::Char }
            / "h" { Length::Short }
            / "ll" { Length::LongLong }
            / "l" { Length::Long }
            / "j" { Length::IntMax }
            / "z" { Length::Size }
            / "t" { Length::PtrDiff }
            / "L" { Length::LongDouble }
        rule conversion() -> Segment
            = start:position!() "%" flags() width:width()? precision:precision()? length:length()?
              conversion:[_]? end:position!()
            {
                Segment::Conversion(RawConversion { span: start..end, width, precision, length, conversion })
            }
        rule literal() -> Segment
            = start:position!() ("%%" / "\\" [_] / "\\" / [^ '%' | '\\'])+ end:position!()
            { Segment::Literal(start..end) }
        pub rule segments() -> Vec<Segment>
            = (literal() / conversion())*
    }
}
