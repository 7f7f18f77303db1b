//! # shapecheck-python
//!
//! Tree-sitter based Python support for shapecheck.
//!
//! [`PythonExtractor`] parses `.py` files and lowers them into element trees
//! shaped like Python's `ast` module: node classes become elements, child
//! fields become wrapper elements and scalar fields become attributes. A
//! pattern such as `.//FunctionDef[not(contains(@name, 'test_'))]` therefore
//! reads the same way it would against `ast.dump` output.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod lower;
pub mod python;

pub use python::PythonExtractor;
