use pkg_config::Config;

fn main() {
    if let Err(e) = Config::new().atleast_version("219").find("libudev") {
        panic!(
            "At least version 219 of libudev is required to compile mpathd: {}",
            e
        );
    }
}
