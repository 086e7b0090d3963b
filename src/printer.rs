use crate::heap::Heap;
use crate::value::{ClosureKind, ObjRef, Object};

/// Print an object to a string.
///
/// `readably` quotes and escapes strings so the reader can read them back; display
/// mode writes string contents raw.
pub fn print(heap: &Heap, obj: ObjRef, readably: bool) -> String {
    let mut out = String::new();
    print_inner(heap, obj, readably, &mut out, 0);
    out
}

fn print_inner(heap: &Heap, obj: ObjRef, readably: bool, out: &mut String, depth: usize) {
    if depth > 1000 {
        out.push_str("...");
        return;
    }

    match heap.get(obj) {
        Object::Number(n) => out.push_str(&format_number(*n)),
        Object::Symbol(name) => out.push_str(&String::from_utf8_lossy(name)),
        Object::String(text) => {
            if readably {
                print_string(text, out);
            } else {
                out.push_str(&String::from_utf8_lossy(text));
            }
        }
        Object::Cons { car, cdr } => {
            out.push('(');
            print_inner(heap, *car, readably, out, depth + 1);
            let mut current = *cdr;
            while !heap.is_nil(current) {
                match heap.get(current) {
                    Object::Cons { car, cdr } => {
                        out.push(' ');
                        print_inner(heap, *car, readably, out, depth + 1);
                        current = *cdr;
                    }
                    _ => {
                        out.push_str(" . ");
                        print_inner(heap, current, readably, out, depth + 1);
                        break;
                    }
                }
            }
            out.push(')');
        }
        Object::Closure { kind, params, .. } => {
            out.push_str(match kind {
                ClosureKind::Lambda => "#<Lambda ",
                ClosureKind::Macro => "#<Macro ",
            });
            print_inner(heap, *params, readably, out, depth + 1);
            out.push('>');
        }
        Object::Primitive { name, .. } => {
            out.push_str("#<Primitive ");
            out.push_str(name);
            out.push('>');
        }
        Object::Env { vars, .. } => {
            out.push_str("#<Env ");
            print_inner(heap, *vars, readably, out, depth + 1);
            out.push('>');
        }
        Object::Forward(_) => out.push_str("#<Forward>"),
    }
}

/// Quote a string, escaping the characters the reader decodes.
fn print_string(text: &[u8], out: &mut String) {
    out.push('"');
    for ch in String::from_utf8_lossy(text).chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Format a number the way C's `%g` does: six significant digits, trailing zeros
/// dropped, scientific notation below 1e-4 or from 1e6 up.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.into();
    }
    if n.is_infinite() {
        return if n < 0.0 { "-inf" } else { "inf" }.into();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.into();
    }

    const PRECISION: i32 = 6;
    // rounding to the precision first gives the exponent %g decides with
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, n);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exp < -4 || exp >= PRECISION {
        let mantissa = strip_zeros(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exp.abs())
    } else {
        let decimals = (PRECISION - 1 - exp) as usize;
        strip_zeros(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
