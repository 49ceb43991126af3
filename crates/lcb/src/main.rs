use std::sync::Arc;

use lcb_core::config::Config;
use lcb_mtproto::MtprotoConnector;

#[tokio::main]
async fn main() -> Result<(), lcb_core::Error> {
    lcb_core::logging::init("lcb")?;

    let cfg = Arc::new(Config::load()?);
    let connector = Arc::new(MtprotoConnector::new(cfg.mtproto.clone()));

    lcb_telegram::router::run_polling(cfg, connector)
        .await
        .map_err(|e| lcb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
