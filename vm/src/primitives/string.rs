use std::cmp::Ordering;

use heap::CellRef;

use crate::cell::Payload;
use crate::interpreter::Interpreter;
use crate::primitives::{expect_char, expect_index, expect_integer, expect_mutable, expect_string, expect_symbol};
use crate::Result;

fn char_index(text: &str, index: usize) -> Option<usize> {
    text.char_indices().nth(index).map(|(byte, _)| byte)
}

pub fn string_length(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let len = expect_string(interp, args[0], "string-length")?.chars().count();
    interp.make_integer(len as i64)
}

pub fn string_ref(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let k = expect_index(interp, args[1], "string-ref")?;
    let text = expect_string(interp, args[0], "string-ref")?;
    match text.chars().nth(k) {
        Some(c) => interp.make_character(c),
        None => Err(interp.wrong_type("string-ref", "index in range", args[1])),
    }
}

pub fn string_set(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let k = expect_index(interp, args[1], "string-set!")?;
    let c = expect_char(interp, args[2], "string-set!")?;
    let text = expect_string(interp, args[0], "string-set!")?;
    expect_mutable(interp, args[0], "string-set!")?;
    let Some(start) = char_index(text, k) else {
        return Err(interp.wrong_type("string-set!", "index in range", args[1]));
    };
    if let Payload::String(text) = interp.payload_mut(args[0]) {
        let end = start + text[start..].chars().next().map_or(0, char::len_utf8);
        text.replace_range(start..end, c.encode_utf8(&mut [0; 4]));
    }
    Ok(interp.unspecified())
}

pub fn make_string(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let len = expect_index(interp, args[0], "make-string")?;
    let fill = match args.get(1) {
        Some(c) => expect_char(interp, *c, "make-string")?,
        None => ' ',
    };
    let text = interp.string_buffer(len, fill)?;
    interp.make_string(text)
}

pub fn string(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let text = args
        .iter()
        .map(|arg| expect_char(interp, *arg, "string"))
        .collect::<Result<String>>()?;
    interp.make_string(text)
}

pub fn substring(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let start = expect_index(interp, args[1], "substring")?;
    let end = match args.get(2) {
        Some(end) => Some(expect_index(interp, *end, "substring")?),
        None => None,
    };
    let text = expect_string(interp, args[0], "substring")?;
    let len = text.chars().count();
    let end = end.unwrap_or(len);
    if start > end || end > len {
        return Err(interp.wrong_type("substring", "valid range", args[1]));
    }
    let slice: String = text.chars().skip(start).take(end - start).collect();
    interp.make_string(slice)
}

pub fn string_append(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let mut out = String::new();
    for arg in args {
        out.push_str(expect_string(interp, *arg, "string-append")?);
    }
    interp.make_string(out)
}

pub fn string_copy(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let text = expect_string(interp, args[0], "string-copy")?.to_owned();
    interp.make_string(text)
}

pub fn string_fill(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let c = expect_char(interp, args[1], "string-fill!")?;
    let len = expect_string(interp, args[0], "string-fill!")?.chars().count();
    expect_mutable(interp, args[0], "string-fill!")?;
    if let Payload::String(text) = interp.payload_mut(args[0]) {
        *text = std::iter::repeat_n(c, len).collect();
    }
    Ok(interp.unspecified())
}

pub fn string_to_list(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let chars: Vec<char> = expect_string(interp, args[0], "string->list")?.chars().collect();
    interp.reserve(chars.len() * 2)?;
    let mut list = interp.nil();
    for c in chars.into_iter().rev() {
        let cell = interp.make_character(c)?;
        list = interp.cons(cell, list)?;
    }
    Ok(list)
}

pub fn list_to_string(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let items = interp.list_to_vec(args[0])?;
    let text = items
        .into_iter()
        .map(|item| expect_char(interp, item, "list->string"))
        .collect::<Result<String>>()?;
    interp.make_string(text)
}

fn compare_strings(
    interp: &mut Interpreter,
    args: &[CellRef],
    name: &'static str,
    fold_case: bool,
    ok: fn(Ordering) -> bool,
) -> Result<CellRef> {
    let texts = args
        .iter()
        .map(|arg| {
            let text = expect_string(interp, *arg, name)?;
            Ok(if fold_case { text.to_lowercase() } else { text.to_owned() })
        })
        .collect::<Result<Vec<_>>>()?;
    let holds = texts.windows(2).all(|pair| ok(pair[0].cmp(&pair[1])));
    Ok(interp.boolean(holds))
}

pub fn string_eq(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_strings(interp, args, "string=?", false, Ordering::is_eq)
}

pub fn string_lt(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_strings(interp, args, "string<?", false, Ordering::is_lt)
}

pub fn string_gt(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_strings(interp, args, "string>?", false, Ordering::is_gt)
}

pub fn string_le(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_strings(interp, args, "string<=?", false, Ordering::is_le)
}

pub fn string_ge(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_strings(interp, args, "string>=?", false, Ordering::is_ge)
}

pub fn string_ci_eq(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_strings(interp, args, "string-ci=?", true, Ordering::is_eq)
}

pub fn string_upcase(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let text = expect_string(interp, args[0], "string-upcase")?.to_uppercase();
    interp.make_string(text)
}

pub fn string_downcase(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let text = expect_string(interp, args[0], "string-downcase")?.to_lowercase();
    interp.make_string(text)
}

/// The name of a symbol is immutable.
pub fn symbol_to_string(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let name = expect_symbol(interp, args[0], "symbol->string")?.to_owned();
    interp.make_immutable_string(name)
}

pub fn string_to_symbol(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let name = expect_string(interp, args[0], "string->symbol")?.to_owned();
    interp.intern(&name)
}

pub fn char_to_integer(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let c = expect_char(interp, args[0], "char->integer")?;
    interp.make_integer(i64::from(u32::from(c)))
}

pub fn integer_to_char(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let code = expect_integer(interp, args[0], "integer->char")?;
    match u32::try_from(code).ok().and_then(char::from_u32) {
        Some(c) => interp.make_character(c),
        None => Err(interp.wrong_type("integer->char", "unicode scalar value", args[0])),
    }
}

fn map_char(interp: &mut Interpreter, args: &[CellRef], name: &'static str, f: fn(char) -> char) -> Result<CellRef> {
    let c = expect_char(interp, args[0], name)?;
    interp.make_character(f(c))
}

pub fn char_upcase(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    map_char(interp, args, "char-upcase", |c| c.to_uppercase().next().unwrap_or(c))
}

pub fn char_downcase(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    map_char(interp, args, "char-downcase", |c| c.to_lowercase().next().unwrap_or(c))
}

fn classify(interp: &mut Interpreter, args: &[CellRef], name: &'static str, test: fn(char) -> bool) -> Result<CellRef> {
    let c = expect_char(interp, args[0], name)?;
    Ok(interp.boolean(test(c)))
}

pub fn is_char_alphabetic(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    classify(interp, args, "char-alphabetic?", char::is_alphabetic)
}

pub fn is_char_numeric(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    classify(interp, args, "char-numeric?", char::is_numeric)
}

pub fn is_char_whitespace(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    classify(interp, args, "char-whitespace?", char::is_whitespace)
}

pub fn is_char_upper_case(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    classify(interp, args, "char-upper-case?", char::is_uppercase)
}

pub fn is_char_lower_case(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    classify(interp, args, "char-lower-case?", char::is_lowercase)
}

fn compare_chars(
    interp: &mut Interpreter,
    args: &[CellRef],
    name: &'static str,
    fold_case: bool,
    ok: fn(Ordering) -> bool,
) -> Result<CellRef> {
    let chars = args
        .iter()
        .map(|arg| {
            let c = expect_char(interp, *arg, name)?;
            Ok(if fold_case { c.to_lowercase().next().unwrap_or(c) } else { c })
        })
        .collect::<Result<Vec<_>>>()?;
    let holds = chars.windows(2).all(|pair| ok(pair[0].cmp(&pair[1])));
    Ok(interp.boolean(holds))
}

pub fn char_eq(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_chars(interp, args, "char=?", false, Ordering::is_eq)
}

pub fn char_lt(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_chars(interp, args, "char<?", false, Ordering::is_lt)
}

pub fn char_gt(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_chars(interp, args, "char>?", false, Ordering::is_gt)
}

pub fn char_le(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_chars(interp, args, "char<=?", false, Ordering::is_le)
}

pub fn char_ge(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_chars(interp, args, "char>=?", false, Ordering::is_ge)
}

pub fn char_ci_eq(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_chars(interp, args, "char-ci=?", true, Ordering::is_eq)
}
