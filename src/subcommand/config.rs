use super::*;

#[derive(Parser, Debug)]
pub(crate) struct Config {}

impl Config {
    pub(crate) fn run(self, settings: Settings) -> Result {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        Ok(())
    }
}
