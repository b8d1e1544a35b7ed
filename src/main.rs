fn main() {
    let command_line_interface = fragmap::cli::CommandLineInterface::load();
    command_line_interface.run();
}
