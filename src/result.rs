extern crate anyhow;

pub type TubeResult<T> = anyhow::Result<T>;

pub fn make_error(msg: &str) -> anyhow::Error {
    return anyhow::anyhow!(msg.to_string());
}
