fn main() {
    let exit_code = match nb::run::run() {
        Ok(code) => code,
        Err(err) => {
            println!("nb: error: {}", err);
            1
        }
    };
    std::process::exit(exit_code);
}
