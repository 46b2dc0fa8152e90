fn main() {
    std::process::exit(stratum_proxy::main());
}
