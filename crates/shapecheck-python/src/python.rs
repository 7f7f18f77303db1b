//! Python language extractor using Tree-sitter.

use shapecheck_core::{Extractor, SyntaxError, SyntaxTree};
use tracing::trace;
use tree_sitter::{Language, Node, Parser};

use crate::lower;

/// Parses Python source into `ast`-shaped trees.
pub struct PythonExtractor {
    language: Language,
}

impl PythonExtractor {
    /// Creates a new Python extractor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            language: tree_sitter_python::LANGUAGE.into(),
        }
    }
}

impl Default for PythonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// First `ERROR` or `MISSING` node in document order.
fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

fn syntax_error(node: Node<'_>) -> SyntaxError {
    let start = node.start_position();
    let message = if node.is_missing() {
        format!("expected '{}'", node.kind())
    } else {
        "invalid syntax".to_string()
    };
    SyntaxError::new(start.row + 1, start.column + 1, message)
}

/// First node, in document order, that the grammar accepts but Python 3 rejects.
fn first_rejected(root: Node<'_>) -> Option<(Node<'_>, &'static str)> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if let Some(message) = rejection(node) {
            return Some((node, message));
        }
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

fn rejection(node: Node<'_>) -> Option<&'static str> {
    match node.kind() {
        "print_statement" => Some("Missing parentheses in call to 'print'"),
        "exec_statement" => Some("Missing parentheses in call to 'exec'"),
        "delete_statement" => {
            let mut cursor = node.walk();
            let targets: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
            targets
                .into_iter()
                .any(|t| !t.is_extra() && !deletable(t))
                .then_some("cannot delete expression")
        }
        "argument_list" => argument_order(node),
        _ => None,
    }
}

fn deletable(node: Node<'_>) -> bool {
    match node.kind() {
        "identifier" | "attribute" | "subscript" => true,
        "tuple" | "list" | "expression_list" | "parenthesized_expression" => {
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
            children.into_iter().all(|c| c.is_extra() || deletable(c))
        }
        _ => false,
    }
}

/// Positional arguments may not follow keywords, and `*x` may not follow `**y`.
fn argument_order(node: Node<'_>) -> Option<&'static str> {
    let mut keyword = false;
    let mut double_splat = false;
    let mut cursor = node.walk();
    for arg in node.named_children(&mut cursor).filter(|a| !a.is_extra()) {
        match arg.kind() {
            "keyword_argument" => keyword = true,
            "dictionary_splat" => double_splat = true,
            "list_splat" if double_splat => {
                return Some("iterable argument unpacking follows keyword argument unpacking");
            }
            "list_splat" => {}
            _ if double_splat => {
                return Some("positional argument follows keyword argument unpacking");
            }
            _ if keyword => return Some("positional argument follows keyword argument"),
            _ => {}
        }
    }
    None
}

impl Extractor for PythonExtractor {
    fn language_id(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".py"]
    }

    fn extract(&self, source: &str) -> Result<SyntaxTree, SyntaxError> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| SyntaxError::new(1, 1, format!("failed to load Python grammar: {e}")))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| SyntaxError::new(1, 1, "parser produced no tree"))?;
        let root = tree.root_node();

        if root.has_error() {
            let node = first_error(root).unwrap_or(root);
            let error = syntax_error(node);
            trace!("Syntax error at {}:{}", error.line, error.column);
            return Err(error);
        }
        if let Some((node, message)) = first_rejected(root) {
            let start = node.start_position();
            trace!("Rejected {} at {}:{}", node.kind(), start.row + 1, start.column + 1);
            return Err(SyntaxError::new(start.row + 1, start.column + 1, message));
        }

        Ok(lower::lower(root, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shapecheck_core::query::XPath;

    fn extract(src: &str) -> SyntaxTree {
        PythonExtractor::new().extract(src).unwrap()
    }

    fn count(src: &str, expr: &str) -> usize {
        XPath::compile(expr).unwrap().select(&extract(src)).unwrap().len()
    }

    #[test]
    fn assignment_shape() {
        insta::assert_snapshot!(extract("x = 1\n").to_xml(), @r#"
        <Module>
          <body>
            <Assign lineno="1" col_offset="0" end_lineno="1" end_col_offset="5">
              <targets>
                <Name lineno="1" col_offset="0" end_lineno="1" end_col_offset="1" id="x">
                  <ctx>
                    <Store/>
                  </ctx>
                </Name>
              </targets>
              <value>
                <Constant lineno="1" col_offset="4" end_lineno="1" end_col_offset="5" value="1"/>
              </value>
            </Assign>
          </body>
        </Module>
        "#);
    }

    #[test]
    fn function_with_keyword_only_argument() {
        insta::assert_snapshot!(extract("def f(a, *, b=1):\n    pass\n").to_xml(), @r#"
        <Module>
          <body>
            <FunctionDef lineno="1" col_offset="0" end_lineno="2" end_col_offset="8" name="f">
              <args>
                <arguments>
                  <args>
                    <arg lineno="1" col_offset="6" end_lineno="1" end_col_offset="7" arg="a"/>
                  </args>
                  <kwonlyargs>
                    <arg lineno="1" col_offset="12" end_lineno="1" end_col_offset="13" arg="b"/>
                  </kwonlyargs>
                  <kw_defaults>
                    <Constant lineno="1" col_offset="14" end_lineno="1" end_col_offset="15" value="1"/>
                  </kw_defaults>
                </arguments>
              </args>
              <body>
                <Pass lineno="2" col_offset="4" end_lineno="2" end_col_offset="8"/>
              </body>
            </FunctionDef>
          </body>
        </Module>
        "#);
    }

    #[test]
    fn empty_source_is_a_bare_module() {
        let tree = extract("");
        assert_eq!(tree.to_xml(), "<Module/>\n");
    }

    #[test]
    fn comments_leave_no_trace() {
        assert_eq!(count("# hello\nx = 1  # trailing\n", "//*[contains(name(), 'omment')]"), 0);
        assert_eq!(count("# hello\nx = 1\n", "/Module/body/Assign"), 1);
    }

    #[test]
    fn elif_nests_in_orelse() {
        let src = "if a:\n    pass\nelif b:\n    pass\nelse:\n    x = 1\n";
        assert_eq!(count(src, "/Module/body/If/orelse/If/orelse/Assign"), 1);
        assert_eq!(count(src, "//If"), 2);
    }

    #[test]
    fn decorated_class_keeps_its_decorators() {
        let src = "@dataclass\nclass Point(Base, metaclass=Meta):\n    x: int = 0\n";
        assert_eq!(count(src, "//ClassDef[@name='Point']/decorator_list/Name[@id='dataclass']"), 1);
        assert_eq!(count(src, "//ClassDef/bases/Name[@id='Base']"), 1);
        assert_eq!(count(src, "//ClassDef/keywords/keyword[@arg='metaclass']"), 1);
        assert_eq!(count(src, "//AnnAssign[@simple='1']/annotation/Name[@id='int']"), 1);
    }

    #[test]
    fn async_functions_are_distinguished() {
        let src = "async def f():\n    await g()\n\ndef h():\n    pass\n";
        assert_eq!(count(src, "//AsyncFunctionDef[@name='f']//Await/value/Call"), 1);
        assert_eq!(count(src, "//FunctionDef"), 1);
    }

    #[test]
    fn imports_record_modules_and_aliases() {
        let src = "import os.path as p\nfrom ..pkg import a, b as c\nfrom x import *\n";
        assert_eq!(count(src, "//Import/names/alias[@name='os.path'][@asname='p']"), 1);
        assert_eq!(count(src, "//ImportFrom[@module='pkg'][@level='2']/names/alias"), 2);
        assert_eq!(count(src, "//ImportFrom/names/alias[@name='*']"), 1);
    }

    #[test]
    fn comparisons_and_operators() {
        let src = "ok = a not in b and c is not None or -d > 0x10\n";
        assert_eq!(count(src, "//BoolOp[op/Or]/values/BoolOp[op/And]"), 1);
        assert_eq!(count(src, "//Compare/ops/NotIn"), 1);
        assert_eq!(count(src, "//Compare/ops/IsNot"), 1);
        assert_eq!(count(src, "//UnaryOp[op/USub]/operand/Name[@id='d']"), 1);
        assert_eq!(count(src, "//Constant[@value='16']"), 1);
    }

    #[test]
    fn strings_and_fstrings() {
        let src = "s = 'a\\tb'\nt = f'{x!r} and {y}'\n";
        assert_eq!(count(src, "//Constant[@value='a\tb']"), 1);
        assert_eq!(count(src, "//JoinedStr/values/FormattedValue[@conversion='114']"), 1);
        assert_eq!(count(src, "//JoinedStr/values/Constant[@value=' and ']"), 1);
    }

    #[test]
    fn try_with_and_comprehensions() {
        let src = "\
try:
    with open(p) as fh:
        data = [line for line in fh if line]
except ValueError as e:
    raise RuntimeError() from e
finally:
    pass
";
        assert_eq!(count(src, "//Try/handlers/ExceptHandler[@name='e']/type/Name"), 1);
        assert_eq!(count(src, "//With/items/withitem/optional_vars/Name[@id='fh']/ctx/Store"), 1);
        assert_eq!(count(src, "//ListComp/generators/comprehension/ifs/Name"), 1);
        assert_eq!(count(src, "//Raise/cause/Name[@id='e']"), 1);
        assert_eq!(count(src, "//Try/finalbody/Pass"), 1);
    }

    #[test]
    fn invalid_source_reports_first_error() {
        let err = PythonExtractor::new()
            .extract("def broken(:\n    pass\n")
            .unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.column >= 1);
        assert!(!err.message.is_empty());
    }

    #[test]
    fn python2_and_invalid_statements_are_rejected() {
        for (src, line) in [
            ("print \"hello\"\n", 1),
            ("x = 1\nexec \"x = 1\"\n", 2),
            ("print >>f, x\n", 1),
            ("del 1\n", 1),
            ("del a, f()\n", 1),
            ("f(**x, *y)\n", 1),
            ("f(a=1, b)\n", 1),
            ("class C(**k, B):\n    pass\n", 1),
        ] {
            let err = PythonExtractor::new().extract(src).unwrap_err();
            assert_eq!(err.line, line, "{src:?}");
        }
        let err = PythonExtractor::new().extract("print \"hi\"\n").unwrap_err();
        assert!(err.message.contains("print"));
    }

    #[test]
    fn python3_forms_of_rejected_statements_parse() {
        assert_eq!(count("print(\"hi\", file=f)\n", "//Call/func/Name[@id='print']"), 1);
        assert_eq!(count("exec(\"x = 1\")\n", "//Call"), 1);
        assert_eq!(count("del a, b.c, d[0], (e, [g])\n", "//Delete/targets/*"), 4);
        assert_eq!(count("f(a, *b, c=1, *d, **e)\n", "//Call/keywords/keyword"), 2);
    }

    #[test]
    fn claims_py_files() {
        let extractor = PythonExtractor::default();
        assert!(extractor.handles(std::path::Path::new("pkg/mod.py")));
        assert!(!extractor.handles(std::path::Path::new("pkg/mod.pyc")));
        assert_eq!(extractor.language_id(), "python");
    }
}
