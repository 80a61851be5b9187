fn main() {
    cognispark_lib::run()
}
