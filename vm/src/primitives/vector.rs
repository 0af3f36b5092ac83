use heap::CellRef;

use crate::cell::Payload;
use crate::interpreter::Interpreter;
use crate::primitives::{expect_index, expect_mutable};
use crate::Result;

fn expect_vector<'a>(interp: &'a Interpreter, value: CellRef, procedure: &str) -> Result<&'a [CellRef]> {
    match interp.payload(value) {
        Payload::Vector(items) => Ok(items),
        _ => Err(interp.wrong_type(procedure, "vector", value)),
    }
}

pub fn make_vector(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let len = expect_index(interp, args[0], "make-vector")?;
    let fill = args.get(1).copied().unwrap_or(interp.unspecified());
    let mut items = interp.buffer(len)?;
    items.resize(len, fill);
    interp.make_vector(items)
}

pub fn vector(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    interp.make_vector(args.to_vec())
}

pub fn vector_length(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let len = expect_vector(interp, args[0], "vector-length")?.len();
    interp.make_integer(len as i64)
}

pub fn vector_ref(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let k = expect_index(interp, args[1], "vector-ref")?;
    let items = expect_vector(interp, args[0], "vector-ref")?;
    items
        .get(k)
        .copied()
        .ok_or_else(|| interp.wrong_type("vector-ref", "index in range", args[1]))
}

pub fn vector_set(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let k = expect_index(interp, args[1], "vector-set!")?;
    let len = expect_vector(interp, args[0], "vector-set!")?.len();
    expect_mutable(interp, args[0], "vector-set!")?;
    if k >= len {
        return Err(interp.wrong_type("vector-set!", "index in range", args[1]));
    }
    if let Payload::Vector(items) = interp.payload_mut(args[0]) {
        items[k] = args[2];
    }
    Ok(interp.unspecified())
}

pub fn vector_fill(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    expect_vector(interp, args[0], "vector-fill!")?;
    expect_mutable(interp, args[0], "vector-fill!")?;
    if let Payload::Vector(items) = interp.payload_mut(args[0]) {
        items.fill(args[1]);
    }
    Ok(interp.unspecified())
}

pub fn vector_to_list(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let items = expect_vector(interp, args[0], "vector->list")?.to_vec();
    interp.list_from(&items)
}

pub fn list_to_vector(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let items = interp.list_to_vec(args[0])?;
    interp.make_vector(items)
}

#[cfg(test)]
mod tests {
    use crate::interpreter::Interpreter;
    use crate::Error;

    fn eval(interp: &mut Interpreter, source: &str) -> String {
        let value = interp.eval_str(source).unwrap();
        interp.write_to_string(value)
    }

    #[test]
    fn vector_operations() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(eval(&mut interp, "(make-vector 3 0)"), "#(0 0 0)");
        assert_eq!(eval(&mut interp, "(vector 1 'a \"s\")"), "#(1 a \"s\")");
        assert_eq!(eval(&mut interp, "(vector-ref #(1 2 3) 2)"), "3");
        assert_eq!(eval(&mut interp, "(vector-length #())"), "0");
        assert_eq!(eval(&mut interp, "(define v (make-vector 2 #f)) (vector-set! v 0 'x) v"), "#(x #f)");
        assert_eq!(eval(&mut interp, "(vector-fill! v 7) v"), "#(7 7)");
        assert_eq!(eval(&mut interp, "(vector->list #(1 2))"), "(1 2)");
        assert_eq!(eval(&mut interp, "(list->vector '(1 2))"), "#(1 2)");
    }

    #[test]
    fn out_of_range_index_is_a_type_error() {
        let mut interp = Interpreter::new().unwrap();
        assert!(matches!(
            interp.eval_str("(vector-ref (vector 1) 1)"),
            Err(Error::WrongType { .. })
        ));
    }
}
