use anyhow::{bail, Result};

use autoclaim::client::BeduClient;
use autoclaim::config::Config;
use autoclaim::models::TaskKind;

pub async fn labels(config: Config, task_type: &str) -> Result<()> {
    let kind: TaskKind = task_type.parse()?;
    let session = config.server.session();
    session.validate()?;

    let client = BeduClient::from_config(&config.server)?;
    let response = client.get_labels(&session, kind).await?;

    if response.errno != 0 {
        bail!("Failed to fetch labels: {} (errno {})", response.errmsg, response.errno);
    }

    println!("Label filters for {kind}");
    println!("========================");
    for filter in &response.data.filter {
        println!("{} ({}):", filter.name, filter.id);
        for option in &filter.list {
            println!("  {:>4}  {}", option.id, option.name);
        }
    }

    Ok(())
}

pub async fn user(config: Config) -> Result<()> {
    let session = config.server.session();
    session.validate()?;

    let client = BeduClient::from_config(&config.server)?;
    let response = client.get_user_info(&session).await?;

    if response.errno != 0 {
        bail!("Failed to fetch user info: {} (errno {})", response.errmsg, response.errno);
    }

    let user = response.data;
    println!("User:  {}", user.user_name);
    if !user.role_names.is_empty() {
        println!("Roles: {}", user.role_names.join(", "));
    }

    Ok(())
}
