use heap::CellRef;

use crate::interpreter::Interpreter;
use crate::primitives::expect_index;
use crate::Result;

pub fn cons(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    interp.cons(args[0], args[1])
}

pub fn car(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    interp.car(args[0])
}

pub fn cdr(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    interp.cdr(args[0])
}

/// Walks `path` right to left: `b"ad"` is `cadr`.
fn cxr(interp: &Interpreter, mut value: CellRef, path: &[u8], name: &str) -> Result<CellRef> {
    for step in path.iter().rev() {
        let (car, cdr) = interp
            .pair(value)
            .ok_or_else(|| interp.wrong_type(name, "pair", value))?;
        value = if *step == b'a' { car } else { cdr };
    }
    Ok(value)
}

pub fn caar(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    cxr(interp, args[0], b"aa", "caar")
}

pub fn cadr(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    cxr(interp, args[0], b"ad", "cadr")
}

pub fn cdar(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    cxr(interp, args[0], b"da", "cdar")
}

pub fn cddr(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    cxr(interp, args[0], b"dd", "cddr")
}

pub fn caddr(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    cxr(interp, args[0], b"add", "caddr")
}

pub fn cdddr(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    cxr(interp, args[0], b"ddd", "cdddr")
}

pub fn cadddr(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    cxr(interp, args[0], b"addd", "cadddr")
}

pub fn set_car(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    interp.set_car(args[0], args[1])?;
    Ok(interp.unspecified())
}

pub fn set_cdr(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    interp.set_cdr(args[0], args[1])?;
    Ok(interp.unspecified())
}

pub fn list(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    interp.list_from(args)
}

/// `(list* a b tail)` is `(a b . tail)`.
pub fn list_star(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let (tail, items) = args.split_last().map_or((interp.nil(), args), |(t, i)| (*t, i));
    interp.list_with_tail(items, tail)
}

pub fn length(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let len = interp
        .list_length(args[0])
        .ok_or_else(|| interp.wrong_type("length", "proper list", args[0]))?;
    interp.make_integer(len as i64)
}

/// Copies every argument but the last, which is shared.
pub fn append(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let Some((&last, init)) = args.split_last() else {
        return Ok(interp.nil());
    };
    let mut items = Vec::new();
    for list in init {
        if interp.list_length(*list).is_none() {
            return Err(interp.wrong_type("append", "proper list", *list));
        }
        items.extend(interp.list_to_vec(*list)?);
    }
    interp.list_with_tail(&items, last)
}

pub fn reverse(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    if interp.list_length(args[0]).is_none() {
        return Err(interp.wrong_type("reverse", "proper list", args[0]));
    }
    interp.reverse(args[0])
}

fn drop_front(interp: &Interpreter, list: CellRef, k: usize, name: &str) -> Result<CellRef> {
    let mut cursor = list;
    for _ in 0..k {
        cursor = interp
            .pair(cursor)
            .map(|(_, cdr)| cdr)
            .ok_or_else(|| interp.wrong_type(name, "list long enough", list))?;
    }
    Ok(cursor)
}

pub fn list_tail(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let k = expect_index(interp, args[1], "list-tail")?;
    drop_front(interp, args[0], k, "list-tail")
}

pub fn list_ref(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let k = expect_index(interp, args[1], "list-ref")?;
    let tail = drop_front(interp, args[0], k, "list-ref")?;
    interp
        .pair(tail)
        .map(|(car, _)| car)
        .ok_or_else(|| interp.wrong_type("list-ref", "list long enough", args[0]))
}

pub fn last_pair(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let mut cursor = args[0];
    if interp.pair(cursor).is_none() {
        return Err(interp.wrong_type("last-pair", "pair", cursor));
    }
    while let Some((_, next)) = interp.pair(cursor) {
        if interp.pair(next).is_none() {
            break;
        }
        cursor = next;
    }
    Ok(cursor)
}

/// Successive tails of `list` up to its first non-pair. Stops once a cycle
/// has been detected.
fn tails(interp: &Interpreter, list: CellRef) -> Vec<CellRef> {
    let mut out = Vec::new();
    let (mut fast, mut slow) = (list, list);
    while let Some((_, next)) = interp.pair(fast) {
        out.push(fast);
        fast = next;
        if out.len() % 2 == 0 {
            slow = interp.pair(slow).map_or(slow, |(_, rest)| rest);
            if slow == fast {
                break;
            }
        }
    }
    out
}

fn mem_with(
    interp: &mut Interpreter,
    args: &[CellRef],
    same: fn(&Interpreter, CellRef, CellRef) -> bool,
) -> Result<CellRef> {
    for tail in tails(interp, args[1]) {
        let item = interp.car(tail)?;
        if same(interp, args[0], item) {
            return Ok(tail);
        }
    }
    Ok(interp.f())
}

fn ass_with(
    interp: &mut Interpreter,
    args: &[CellRef],
    name: &str,
    same: fn(&Interpreter, CellRef, CellRef) -> bool,
) -> Result<CellRef> {
    for tail in tails(interp, args[1]) {
        let entry = interp.car(tail)?;
        let Some((key, _)) = interp.pair(entry) else {
            return Err(interp.wrong_type(name, "association list", args[1]));
        };
        if same(interp, args[0], key) {
            return Ok(entry);
        }
    }
    Ok(interp.f())
}

fn same_eq(_: &Interpreter, a: CellRef, b: CellRef) -> bool {
    a == b
}

fn same_eqv(interp: &Interpreter, a: CellRef, b: CellRef) -> bool {
    interp.eqv(a, b)
}

fn same_equal(interp: &Interpreter, a: CellRef, b: CellRef) -> bool {
    interp.equal(a, b)
}

pub fn memq(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    mem_with(interp, args, same_eq)
}

pub fn memv(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    mem_with(interp, args, same_eqv)
}

pub fn member(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    mem_with(interp, args, same_equal)
}

pub fn assq(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    ass_with(interp, args, "assq", same_eq)
}

pub fn assv(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    ass_with(interp, args, "assv", same_eqv)
}

pub fn assoc(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    ass_with(interp, args, "assoc", same_equal)
}
