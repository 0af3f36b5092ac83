use std::fs::File;

use heap::CellRef;

use crate::cell::Payload;
use crate::interpreter::Interpreter;
use crate::port::{Port, PortFlags};
use crate::primitives::{expect_char, expect_string};
use crate::{Error, Result};

/// The port argument at `index`, or the current port when it is absent.
fn port_arg(interp: &Interpreter, args: &[CellRef], index: usize, current: CellRef, procedure: &str) -> Result<CellRef> {
    let port = args.get(index).copied().unwrap_or(current);
    match interp.payload(port) {
        Payload::Port(_) => Ok(port),
        _ => Err(interp.wrong_type(procedure, "port", port)),
    }
}

fn input_port(interp: &Interpreter, args: &[CellRef], index: usize, procedure: &str) -> Result<CellRef> {
    port_arg(interp, args, index, interp.st.inport, procedure)
}

fn output_port(interp: &Interpreter, args: &[CellRef], index: usize, procedure: &str) -> Result<CellRef> {
    port_arg(interp, args, index, interp.st.outport, procedure)
}

fn emit(interp: &mut Interpreter, port: CellRef, text: &str, procedure: &str) -> Result<CellRef> {
    interp.port_mut(port, procedure)?.write_str(text)?;
    Ok(interp.unspecified())
}

pub fn read(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let port = input_port(interp, args, 0, "read")?;
    interp.read_datum(port)
}

fn char_or_eof(interp: &mut Interpreter, c: Option<char>) -> Result<CellRef> {
    match c {
        Some(c) => interp.make_character(c),
        None => Ok(interp.eof()),
    }
}

pub fn read_char(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let port = input_port(interp, args, 0, "read-char")?;
    let c = interp.port_mut(port, "read-char")?.read_char()?;
    char_or_eof(interp, c)
}

pub fn peek_char(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let port = input_port(interp, args, 0, "peek-char")?;
    let c = interp.port_mut(port, "peek-char")?.peek_char()?;
    char_or_eof(interp, c)
}

pub fn char_ready(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let port = input_port(interp, args, 0, "char-ready?")?;
    let ready = interp.port_mut(port, "char-ready?")?.char_ready();
    Ok(interp.boolean(ready))
}

pub fn write(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let port = output_port(interp, args, 1, "write")?;
    let text = interp.write_to_string(args[0]);
    emit(interp, port, &text, "write")
}

pub fn display(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let port = output_port(interp, args, 1, "display")?;
    let text = interp.display_to_string(args[0]);
    emit(interp, port, &text, "display")
}

pub fn write_char(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let c = expect_char(interp, args[0], "write-char")?;
    let port = output_port(interp, args, 1, "write-char")?;
    emit(interp, port, c.encode_utf8(&mut [0; 4]), "write-char")
}

pub fn newline(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let port = output_port(interp, args, 0, "newline")?;
    emit(interp, port, "\n", "newline")
}

fn open_file(path: &str, procedure: &str, open: fn(&str) -> std::io::Result<File>) -> Result<File> {
    open(path).map_err(|err| {
        Error::Io(std::io::Error::new(err.kind(), format!("{procedure}: {path}: {err}")))
    })
}

pub fn open_input_file(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let path = expect_string(interp, args[0], "open-input-file")?.to_owned();
    let file = open_file(&path, "open-input-file", |p| File::open(p))?;
    interp.make_port(Port::input_file(file, path))
}

pub fn open_output_file(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let path = expect_string(interp, args[0], "open-output-file")?.to_owned();
    let file = open_file(&path, "open-output-file", |p| File::create(p))?;
    interp.make_port(Port::output_file(file, path))
}

pub fn open_input_string(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let port = Port::input_string(expect_string(interp, args[0], "open-input-string")?);
    interp.make_port(port)
}

pub fn open_output_string(interp: &mut Interpreter, _args: &[CellRef]) -> Result<CellRef> {
    interp.make_port(Port::output_string())
}

pub fn get_output_string(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let text = match interp.payload(args[0]) {
        Payload::Port(port) => port.output_text().map(str::to_owned),
        _ => None,
    };
    match text {
        Some(text) => interp.make_string(text),
        None => Err(interp.wrong_type("get-output-string", "string output port", args[0])),
    }
}

fn close(interp: &mut Interpreter, args: &[CellRef], flag: PortFlags, procedure: &str) -> Result<CellRef> {
    interp.port_mut(args[0], procedure)?.close(flag)?;
    Ok(interp.unspecified())
}

pub fn close_input_port(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    close(interp, args, PortFlags::INPUT, "close-input-port")
}

pub fn close_output_port(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    close(interp, args, PortFlags::OUTPUT, "close-output-port")
}

pub fn current_input_port(interp: &mut Interpreter, _args: &[CellRef]) -> Result<CellRef> {
    Ok(interp.st.inport)
}

pub fn current_output_port(interp: &mut Interpreter, _args: &[CellRef]) -> Result<CellRef> {
    Ok(interp.st.outport)
}

pub fn is_input_port(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let input = matches!(interp.payload(args[0]), Payload::Port(port) if port.is_input());
    Ok(interp.boolean(input))
}

pub fn is_output_port(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let output = matches!(interp.payload(args[0]), Payload::Port(port) if port.is_output());
    Ok(interp.boolean(output))
}

pub fn eof_object(interp: &mut Interpreter, _args: &[CellRef]) -> Result<CellRef> {
    Ok(interp.eof())
}

#[cfg(test)]
mod tests {
    use crate::interpreter::Interpreter;

    fn eval(interp: &mut Interpreter, source: &str) -> String {
        let value = interp.eval_str(source).unwrap();
        interp.write_to_string(value)
    }

    #[test]
    fn string_ports() {
        let mut interp = Interpreter::new().unwrap();
        let source = "(define in (open-input-string \"(a b) 42 x\")) \
                      (list (read in) (read in) (read-char in) (peek-char in) (read in) (eof-object? (read in)))";
        assert_eq!(eval(&mut interp, source), "((a b) 42 #\\space #\\x x #t)");
        let source = "(define out (open-output-string)) \
                      (write \"hi\" out) (display \" there\" out) (write-char #\\! out) (newline out) \
                      (get-output-string out)";
        assert_eq!(eval(&mut interp, source), "\"\\\"hi\\\" there!\\n\"");
    }

    #[test]
    fn display_goes_to_the_current_output_port() {
        let mut interp = Interpreter::new().unwrap();
        interp.set_output_port_string().unwrap();
        interp.eval_str("(display \"x = \") (write 'y) (newline)").unwrap();
        assert_eq!(interp.take_output().as_deref(), Some("x = y\n"));
    }

    #[test]
    fn file_ports_round_trip() {
        let path = std::env::temp_dir().join(format!("lax-port-{}.txt", std::process::id()));
        let path_text = path.display().to_string();
        let mut interp = Interpreter::new().unwrap();
        let source = format!(
            "(define out (open-output-file {path_text:?})) (write '(1 \"two\") out) (close-output-port out) \
             (define in (open-input-file {path_text:?})) (define datum (read in)) (close-input-port in) datum"
        );
        assert_eq!(eval(&mut interp, &source), "(1 \"two\")");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn port_predicates() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(
            eval(&mut interp, "(list (input-port? (current-input-port)) (output-port? (current-input-port)))"),
            "(#t #f)"
        );
    }
}
