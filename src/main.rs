fn main() {
    decorator_pass::cli::run();
}
