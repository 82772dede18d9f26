//! Compact rendering of `agex_core::Value` for prompt text, grounded in
//! the original value renderer's per-type strategies: sized containers
//! collapse to an item count past a depth or item-count ceiling, strings
//! truncate past a length ceiling, everything else falls back to a plain
//! rendering.

use agex_core::Value;

/// Renders a `Value` tree into a string short enough to drop into a
/// prompt, bounding recursion depth, item count, and per-container text
/// length independently so one huge leaf can't blow the whole budget.
#[derive(Debug, Clone, Copy)]
pub struct ValueRenderer {
    pub max_len: usize,
    pub max_depth: usize,
    pub max_items: usize,
}

impl Default for ValueRenderer {
    fn default() -> Self {
        Self {
            max_len: 2048,
            max_depth: 2,
            max_items: 50,
        }
    }
}

impl ValueRenderer {
    pub fn render(&self, value: &Value) -> String {
        self.render_at(value, 0)
    }

    fn render_at(&self, value: &Value, depth: usize) -> String {
        match value {
            Value::None => "None".to_string(),
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(x) => x.to_string(),
            Value::Str(s) => self.render_string(s),
            Value::Bytes(b) => format!("b{:?}", String::from_utf8_lossy(b)),
            Value::List(items) => {
                let items = items.borrow();
                if depth >= self.max_depth {
                    return format!("[... ({} items)]", items.len());
                }
                format!("[{}]", self.render_bounded(items.iter(), items.len(), depth))
            }
            Value::Tuple(items) => {
                if depth >= self.max_depth {
                    return format!("(... ({} items))", items.len());
                }
                let inner = self.render_bounded(items.iter(), items.len(), depth);
                if items.len() == 1 {
                    format!("({inner},)")
                } else {
                    format!("({inner})")
                }
            }
            Value::Set(s) => {
                let s = s.borrow();
                if s.0.is_empty() {
                    return "set()".to_string();
                }
                if depth >= self.max_depth {
                    return format!("{{... ({} items)}}", s.0.len());
                }
                format!("{{{}}}", self.render_bounded(s.0.iter().map(|v| &v.0), s.0.len(), depth))
            }
            Value::Dict(d) => {
                let d = d.borrow();
                if depth >= self.max_depth {
                    return format!("{{... ({} items)}}", d.0.len());
                }
                let mut rendered = Vec::new();
                for (k, v) in d.0.iter() {
                    if d.0.len() > self.max_items {
                        break;
                    }
                    let item = format!("{}: {}", self.render_at(&k.0, depth + 1), self.render_at(v, depth + 1));
                    let so_far: usize = rendered.iter().map(|s: &String| s.len() + 2).sum();
                    if so_far + item.len() > self.max_len {
                        rendered.push(format!("... ({} more)", d.0.len() - rendered.len()));
                        break;
                    }
                    rendered.push(item);
                }
                if d.0.len() > self.max_items {
                    return format!("{{... ({} items)}}", d.0.len());
                }
                format!("{{{}}}", rendered.join(", "))
            }
        }
    }

    fn render_bounded<'a, I>(&self, items: I, len: usize, depth: usize) -> String
    where
        I: Iterator<Item = &'a Value>,
    {
        if len > self.max_items {
            return format!("... ({len} items)");
        }
        let mut rendered: Vec<String> = Vec::new();
        for (i, item) in items.enumerate() {
            let s = self.render_at(item, depth + 1);
            let so_far: usize = rendered.iter().map(|s: &String| s.len() + 2).sum();
            if so_far + s.len() > self.max_len {
                rendered.push(format!("... ({} more)", len - i));
                break;
            }
            rendered.push(s);
        }
        rendered.join(", ")
    }

    fn render_string(&self, s: &str) -> String {
        if s.chars().count() > self.max_len {
            let truncated: String = s.chars().take(self.max_len).collect();
            format!("{:?}", format!("{truncated}..."))
        } else {
            format!("{s:?}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agex_core::{OrderedValue, ValueMap};

    #[test]
    fn primitives_render_python_style() {
        let r = ValueRenderer::default();
        assert_eq!(r.render(&Value::None), "None");
        assert_eq!(r.render(&Value::Bool(true)), "True");
        assert_eq!(r.render(&Value::Int(7)), "7");
    }

    #[test]
    fn single_item_tuple_gets_trailing_comma() {
        let r = ValueRenderer::default();
        let t = Value::tuple(vec![Value::Int(1)]);
        assert_eq!(r.render(&t), "(1,)");
    }

    #[test]
    fn oversized_list_collapses_to_item_count() {
        let r = ValueRenderer {
            max_items: 3,
            ..ValueRenderer::default()
        };
        let l = Value::list((0..10).map(Value::Int).collect());
        assert_eq!(r.render(&l), "[... (10 items)]");
    }

    #[test]
    fn depth_ceiling_collapses_nested_containers() {
        let r = ValueRenderer {
            max_depth: 1,
            ..ValueRenderer::default()
        };
        let nested = Value::list(vec![Value::list(vec![Value::Int(1), Value::Int(2)])]);
        assert_eq!(r.render(&nested), "[[... (2 items)]]");
    }

    #[test]
    fn dict_renders_key_value_pairs() {
        let r = ValueRenderer::default();
        let d = Value::dict(ValueMap(
            [(OrderedValue(Value::Str("a".into())), Value::Int(1))]
                .into_iter()
                .collect(),
        ));
        assert_eq!(r.render(&d), "{\"a\": 1}");
    }
}
