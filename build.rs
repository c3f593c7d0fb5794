fn main() {
    // No-op on host targets; emits ESP-IDF link/env metadata when the
    // espidf toolchain environment is present.
    embuild::espidf::sysenv::output();
}
