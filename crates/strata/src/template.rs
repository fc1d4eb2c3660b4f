//! template bodies and rendering
//!
//! Templates are [minijinja] templates rendered against a flat [Vars] context. Missing variables render empty.
//!
//! Helpers available on top of the minijinja builtins:
//!
//! | helper | result |
//! |--------|--------|
//! | `val(name)` | value of the variable called `name` (dynamic lookup) |
//! | `coalesce(a, b, ...)` | first argument that is defined and not none |
//! | `quotedlist(s, sep)` | `"a", "b"` from `a<sep>b`, empty for undefined `s` |
//! | `sequence(start, len)` | `[start, start + 1, ...]` with `len` elements |
//! | `isfile(path)` | whether `path` is an existing regular file |
//! | `decode64(s)` | base64-decoded `s` |
//! | `match(s, re)` | whether `s` matches regex `re`, false for undefined `s` |
//! | `regexrepl(s, re, repl)` | every match of `re` in `s` replaced by `repl` (`$1` refers to groups) |
//! | `timeoffset(seed)` | CRC32 of `seed` modulo 60, random for an empty seed |
//! | `tostr(v)` / `safe(v)` | `v` as a string, empty for undefined |
//! | `tolower(s)` | lowercase `s`, empty for undefined |
//! | `strtoi(s)` | `s` parsed as an integer |
//! | `iadd`, `imul`, `idiv`, `imod` | integer arithmetic |
use crate::vars::Vars;
use indexmap::IndexMap;
use minijinja::value::Rest;
use minijinja::{Environment, Error, ErrorKind, State, Value};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Template name to template
pub type Templates = IndexMap<String, Template>;

/// One template body, either given inline or read from a file on first access
#[derive(Debug)]
pub struct Template {
    path: Option<PathBuf>,
    content: OnceLock<String>,
}

impl Template {
    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            path: None,
            content: OnceLock::from(content.into()),
        }
    }

    /// Nothing is read until [Template::content] is called
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            content: OnceLock::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Template body, loaded once and cached
    pub fn content(&self) -> Result<&str, TemplateError> {
        if let Some(content) = self.content.get() {
            return Ok(content);
        }

        // inline templates always have their content set
        let Some(path) = &self.path else {
            return Ok("");
        };

        tracing::debug!(path=%path.display(), "loading template");
        let loaded = std::fs::read_to_string(path).map_err(|source| TemplateError {
            path: path.clone(),
            source,
        })?;

        Ok(self.content.get_or_init(|| loaded))
    }
}

#[derive(thiserror::Error, Debug)]
#[error("unable to read template {}", path.display())]
pub struct TemplateError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Renders template text against [Vars]
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        // config files end with a newline
        env.set_keep_trailing_newline(true);
        register_helpers(&mut env);
        Self { env }
    }

    /// Render `source` in memory, `name` only shows up in error messages
    pub fn render(&self, name: &str, source: &str, vars: &Vars) -> Result<String, Error> {
        self.env.render_named_str(name, source, vars)
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer").finish_non_exhaustive()
    }
}

fn register_helpers(env: &mut Environment<'static>) {
    env.add_function("val", |state: &State, name: &str| -> Value {
        state.lookup(name).unwrap_or(Value::UNDEFINED)
    });

    env.add_function("coalesce", |args: Rest<Value>| -> Value {
        args.iter()
            .find(|value| !value.is_undefined() && !value.is_none())
            .cloned()
            .unwrap_or(Value::UNDEFINED)
    });

    env.add_function(
        "quotedlist",
        |list: Option<String>, separator: &str| -> String {
            match list {
                None => String::new(),
                Some(list) => {
                    let quoted: Vec<_> = list.split(separator).collect();
                    format!("\"{}\"", quoted.join("\", \""))
                }
            }
        },
    );

    env.add_function("sequence", |start: i64, length: i64| -> Vec<i64> {
        (0..length.max(0)).map(|i| start + i).collect()
    });

    env.add_function("isfile", |path: &str| -> bool { Path::new(path).is_file() });

    env.add_function("decode64", |input: &str| -> Result<String, Error> {
        use base64::Engine;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(input)
            .map_err(|e| {
                Error::new(ErrorKind::InvalidOperation, "invalid base64").with_source(e)
            })?;

        String::from_utf8(bytes).map_err(|e| {
            Error::new(ErrorKind::InvalidOperation, "decoded value is not utf-8").with_source(e)
        })
    });

    env.add_function("match", |input: Option<String>, re: &str| -> Result<bool, Error> {
        match input {
            None => Ok(false),
            Some(input) => Ok(compile(re)?.is_match(&input)),
        }
    });

    env.add_function(
        "regexrepl",
        |input: Option<String>, re: &str, replacement: &str| -> Result<String, Error> {
            match input {
                None => Ok(String::new()),
                Some(input) => Ok(compile(re)?.replace_all(&input, replacement).into_owned()),
            }
        },
    );

    env.add_function("timeoffset", |seed: Option<String>| -> u32 {
        match seed.filter(|seed| !seed.is_empty()) {
            Some(seed) => crc32fast::hash(seed.as_bytes()) % 60,
            None => {
                use rand::Rng;
                rand::thread_rng().gen_range(0..60)
            }
        }
    });

    env.add_function("tostr", to_str);
    env.add_function("safe", to_str);
    env.add_function("tolower", |value: Value| -> String { to_str(value).to_lowercase() });

    env.add_function("strtoi", |input: &str| -> Result<i64, Error> {
        input.trim().parse().map_err(|e| {
            Error::new(ErrorKind::InvalidOperation, "not an integer").with_source(e)
        })
    });

    env.add_function("iadd", |x: i64, y: i64| -> Result<i64, Error> {
        x.checked_add(y).ok_or_else(|| overflow("iadd"))
    });
    env.add_function("imul", |x: i64, y: i64| -> Result<i64, Error> {
        x.checked_mul(y).ok_or_else(|| overflow("imul"))
    });
    env.add_function("idiv", |x: i64, y: i64| -> Result<i64, Error> {
        x.checked_div(y).ok_or_else(|| overflow("idiv"))
    });
    env.add_function("imod", |x: i64, m: i64| -> Result<i64, Error> {
        x.checked_rem(m).ok_or_else(|| overflow("imod"))
    });
}

fn compile(re: &str) -> Result<regex::Regex, Error> {
    regex::Regex::new(re)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, "invalid regex").with_source(e))
}

fn to_str(value: Value) -> String {
    if value.is_undefined() || value.is_none() {
        String::new()
    } else {
        value.to_string()
    }
}

fn overflow(helper: &str) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!("{helper}: division by zero or overflow"),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render(source: &str, vars: &[(&str, &str)]) -> String {
        let vars: Vars = vars.iter().copied().collect();
        Renderer::new().render("test", source, &vars).unwrap()
    }

    #[test]
    fn substitution_and_conditionals() {
        assert_eq!(
            render(
                "host={{ host }}{% if port %}:{{ port }}{% endif %}",
                &[("host", "db"), ("port", "5432")]
            ),
            "host=db:5432"
        );
        assert_eq!(
            render(
                "host={{ host }}{% if port %}:{{ port }}{% endif %}",
                &[("host", "db")]
            ),
            "host=db"
        );
    }

    #[test]
    fn trailing_newline_is_kept() {
        assert_eq!(render("port={{ port }}\n", &[("port", "80")]), "port=80\n");
    }

    #[test]
    fn missing_vars_render_empty() {
        assert_eq!(render("[{{ nope }}]", &[]), "[]");
    }

    #[test]
    fn helpers() {
        assert_eq!(
            render("{% set x = 0 %}{{ val('var' ~ x) }}", &[("var0", "var0")]),
            "var0"
        );
        assert_eq!(render("{% for i in sequence(0, 2) %}{{ i }},{% endfor %}", &[]), "0,1,");
        assert_eq!(render("{{ coalesce(nonexist, 5) }}", &[]), "5");
        assert_eq!(render("{{ quotedlist(nonexist, ',') }}", &[]), "");
        assert_eq!(render("{{ quotedlist('one,two', ',') }}", &[]), "\"one\", \"two\"");
        assert_eq!(render("{{ decode64('aGVsbG8=') }}", &[]), "hello");
        assert_eq!(render("{{ 'FuNnY' | lower }}", &[]), "funny");
        assert_eq!(
            render("{% if isfile('/blah/blah') %}exists{% else %}missing{% endif %}", &[]),
            "missing"
        );
        assert_eq!(render("{{ regexrepl(nonexist, '([0-9])', '0$1') }}", &[]), "");
        assert_eq!(render("{{ regexrepl('1 and 2', '([0-9])', '0$1') }}", &[]), "01 and 02");
        assert_eq!(render("{{ match(host, '^db') }}", &[("host", "db1")]), "true");
        assert_eq!(render("{{ match(nonexist, '^db') }}", &[]), "false");
        assert_eq!(render("{{ timeoffset('TEST') }}", &[]), "8");
        assert_eq!(render("{{ tolower('FuNnY') }}", &[]), "funny");
        assert_eq!(render("[{{ tostr(nonexist) }}][{{ safe(port) }}]", &[("port", "80")]), "[][80]");
        assert_eq!(render("{{ iadd(strtoi('40'), 2) }}", &[]), "42");
        assert_eq!(render("{{ idiv(7, 3) }},{{ idiv(8, 3) }},{{ imod(7, 3) }},{{ imul(2, 3) }}", &[]), "2,2,1,6");
    }

    #[test]
    fn random_timeoffset_is_a_minute() {
        let offset: u32 = render("{{ timeoffset('') }}", &[]).parse().unwrap();
        assert!(offset < 60);
    }

    #[test]
    fn helper_errors_fail_rendering() {
        let renderer = Renderer::new();
        for source in ["{{ idiv(1, 0) }}", "{{ strtoi('x') }}", "{{ match('a', '(') }}"] {
            let err = renderer.render("helper", source, &Vars::new()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidOperation, "{source}");
        }
    }

    #[test]
    fn broken_template_is_an_error() {
        let err = Renderer::new()
            .render("broken", "{% if %}", &Vars::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
    }

    #[test]
    fn file_template_is_read_lazily_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf");
        std::fs::write(&path, "first").unwrap();

        let template = Template::file(&path);
        std::fs::write(&path, "second").unwrap();
        assert_eq!(template.content().unwrap(), "second");

        std::fs::write(&path, "third").unwrap();
        assert_eq!(template.content().unwrap(), "second");
    }

    #[test]
    fn unreadable_template() {
        let template = Template::file("/nonexistent/strata/template");
        assert!(template.content().is_err());
    }
}
