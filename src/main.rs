fn main() -> Result<(), userhub::AppError> {
    userhub::run("USERHUB_")
}
