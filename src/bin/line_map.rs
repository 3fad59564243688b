//! Inserts `#line` directives into a decorator-generated file.

fn main() {
    decorator_pass::cli::run_line_map();
}
