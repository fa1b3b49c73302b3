pub fn print_startup_banner() {
    let year = chrono::Local::now().format("%Y").to_string();
    let version = env!("CARGO_PKG_VERSION");

    // ANSI color codes
    let blue = "\x1B[38;5;33m";
    let gray = "\x1B[38;5;245m";
    let bright_blue = "\x1B[94m";
    let reset = "\x1B[0m";

    // Printed on stderr so stdout stays clean for piped output
    eprintln!(
        r#"
  {year} trawl
   {blue}
      |\    /|\    /|\    /|
      | \  / | \  / | \  / |      {gray}cast wide,{blue}
      |  \/  |  \/  |  \/  |      {gray}haul in only what you need{blue}
      |  /\  |  /\  |  /\  |
      | /  \ | /  \ | /  \ |
      |/    \|/    \|/    \|
   ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
         {bright_blue}trawl v{version}{reset}
"#,
        year = year,
        blue = blue,
        gray = gray,
        bright_blue = bright_blue,
        version = version,
        reset = reset
    );
}
