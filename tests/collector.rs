use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tinylisp::printer::format_number;
use tinylisp::{Config, LispError, Machine, NullEditor};

fn machine_with_heap(bytes: usize) -> Machine {
    let config = Config {
        heap_capacity: bytes,
        ..Config::default()
    };
    Machine::new(config, Box::new(NullEditor)).unwrap()
}

#[test]
fn heap_too_small_to_start_is_an_error() {
    for bytes in [0, 16, 160, 1024] {
        let config = Config {
            heap_capacity: bytes,
            ..Config::default()
        };
        let result = Machine::new(config, Box::new(NullEditor));
        assert!(matches!(result, Err(LispError::OutOfMemory(_))));
    }
}

#[test]
fn long_running_loop_collects_and_keeps_live_data() {
    let mut m = machine_with_heap(256 * 1024);
    let defs = m.evaluate(
        "(defun build (n acc) (if (= n 0) acc (build (- n 1) (cons n acc))))
         (defun sum (xs acc) (if (null xs) acc (sum (cdr xs) (+ acc (car xs)))))
         (progn (setq xs (build 500 nil)) nil)",
    );
    assert_eq!(defs, "#<Lambda (n acc)>\n#<Lambda (xs acc)>\nnil\n");

    for _ in 0..20 {
        assert_eq!(m.evaluate("(sum xs 0)"), "125250\n");
    }
    assert!(m.heap.collections() > 0);
    assert!(m.heap.used() < m.heap.capacity());
}

#[test]
fn rooted_objects_survive_forced_collections() {
    let mut m = machine_with_heap(256 * 1024);
    let value = m.eval_str("(list 1 \"two\" 'three (cons 4 5))").unwrap();
    let mark = m.heap.root_mark();
    let slot = m.heap.slot(value);

    for _ in 0..3 {
        m.heap.collect();
    }
    let value = m.heap.load(slot);
    assert_eq!(m.print(value, true), "(1 \"two\" three (4 . 5))");
    m.heap.unwind(mark);
}

#[test]
fn unrooted_garbage_is_reclaimed() {
    let mut m = machine_with_heap(256 * 1024);
    m.heap.collect();
    let baseline = m.heap.used();
    m.eval_str("(map1 (lambda (x) (list x x x)) '(1 2 3 4 5 6 7 8))").unwrap();
    assert!(m.heap.used() > baseline);
    m.heap.collect();
    assert_eq!(m.heap.used(), baseline);
}

#[test]
fn symbols_stay_interned_across_collections() {
    let mut m = machine_with_heap(256 * 1024);
    m.evaluate("(setq s 'some-symbol)");
    let count = m.heap.symbol_count();
    m.heap.collect();
    assert_eq!(m.heap.symbol_count(), count);
    assert_eq!(m.evaluate("(eq s 'some-symbol)"), "t\n");
    assert_eq!(m.heap.symbol_count(), count);
}

#[test]
fn exhausted_heap_reports_an_error_and_recovers() {
    let mut m = machine_with_heap(256 * 1024);
    let out = m.evaluate(
        "(defun grow (acc) (grow (cons acc acc)))
         (grow nil)",
    );
    let mut lines = out.lines();
    assert_eq!(lines.next(), Some("#<Lambda (acc)>"));
    assert!(lines.next().is_some_and(|l| l.starts_with("error: out of memory")));

    // the runaway list was only reachable from the failed call
    assert_eq!(m.evaluate("(+ 1 2)"), "3\n");
}

/// Random data in the form the printer writes it.
struct Gen {
    rng: StdRng,
}

impl Gen {
    fn value(&mut self, depth: usize) -> String {
        let choice = if depth >= 4 {
            self.rng.gen_range(0..3)
        } else {
            self.rng.gen_range(0..5)
        };
        match choice {
            0 => self.number(),
            1 => self.symbol(),
            2 => self.string(),
            3 => self.list(depth + 1, false),
            _ => self.list(depth + 1, true),
        }
    }

    fn number(&mut self) -> String {
        let n = match self.rng.gen_range(0..3) {
            0 => self.rng.gen_range(-100_000..100_000) as f64,
            1 => self.rng.gen_range(-4000..4000) as f64 / 8.0,
            // large and tiny magnitudes print with an exponent
            _ => {
                let mantissa = self.rng.gen_range(-999..1000) as f64;
                mantissa * 10f64.powi(self.rng.gen_range(-12..12))
            }
        };
        format_number(n)
    }

    fn symbol(&mut self) -> String {
        let len = self.rng.gen_range(1..8);
        let mut name = String::new();
        name.push(self.rng.gen_range(b'a'..=b'z') as char);
        for _ in 1..len {
            let tail = b"abcdefghijklmnopqrstuvwxyz0123456789-?!*";
            name.push(tail[self.rng.gen_range(0..tail.len())] as char);
        }
        name
    }

    fn string(&mut self) -> String {
        let len = self.rng.gen_range(0..10);
        let mut out = String::from("\"");
        for _ in 0..len {
            match self.rng.gen_range(0..8) {
                0 => out.push_str("\\\""),
                1 => out.push_str("\\\\"),
                2 => out.push_str("\\n"),
                3 => out.push_str("\\t"),
                4 => out.push(' '),
                _ => out.push(self.rng.gen_range(b'a'..=b'z') as char),
            }
        }
        out.push('"');
        out
    }

    fn list(&mut self, depth: usize, dotted: bool) -> String {
        let len = self.rng.gen_range(if dotted { 1..4 } else { 0..5 });
        if len == 0 {
            return "nil".into();
        }
        let items: Vec<String> = (0..len).map(|_| self.value(depth)).collect();
        let mut out = format!("({}", items.join(" "));
        if dotted {
            let tail = match self.rng.gen_range(0..3) {
                0 => self.number(),
                1 => self.symbol(),
                _ => self.string(),
            };
            if tail != "nil" {
                out.push_str(" . ");
                out.push_str(&tail);
            }
        }
        out.push(')');
        out
    }
}

fn is_number(text: &str) -> bool {
    text.starts_with(|c: char| c.is_ascii_digit() || c == '-')
}

#[test]
fn printed_data_reads_back_to_the_same_text() {
    let mut gen = Gen {
        rng: StdRng::seed_from_u64(0x7157),
    };
    let mut m = machine_with_heap(256 * 1024);

    for _ in 0..300 {
        let text = gen.value(0);
        let value = m.eval_str(&format!("(quote {})", text)).unwrap();
        let printed = m.print(value, true);
        assert_eq!(printed, text);
        assert_eq!(m.heap.number(value).is_some(), is_number(&text));

        let again = m.eval_str(&format!("(quote {})", printed)).unwrap();
        assert_eq!(m.print(again, true), printed);
    }
}

#[test]
fn round_trip_survives_a_tiny_heap() {
    let mut gen = Gen {
        rng: StdRng::seed_from_u64(42),
    };
    let mut m = machine_with_heap(160 * 1024);
    let collections = m.heap.collections();

    for _ in 0..300 {
        let text = gen.value(0);
        let value = m.eval_str(&format!("(quote {})", text)).unwrap();
        assert_eq!(m.print(value, true), text);
    }
    assert!(m.heap.collections() > collections);
}
