use evm_token::{parse_address, Address};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Register,
    Balance,
    Account,
    TokenInfo,
    Transfer { amount: u64, recipient: i64 },
    Withdraw { amount: u64, address: Address },
    CheckIn,
    Leaderboard,
    Mint { amount: u64, address: Address },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("❌ 格式错误。用法：{0}")]
    Usage(String),

    #[error("❌ `{0}` 不是一个有效的数量。")]
    InvalidAmount(String),

    #[error("❌ 数量必须大于0！")]
    ZeroAmount,

    #[error("❌ `{0}` 不是一个有效的以太坊地址。")]
    InvalidAddress(String),

    #[error("❌ 请@一位要转账的用户。格式：{0}转账 数量 @用户")]
    MissingRecipient(String),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Register => "register",
            Command::Balance => "balance",
            Command::Account => "account",
            Command::TokenInfo => "token",
            Command::Transfer { .. } => "transfer",
            Command::Withdraw { .. } => "withdraw",
            Command::CheckIn => "checkin",
            Command::Leaderboard => "rank",
            Command::Mint { .. } => "mint",
        }
    }

    /// `Ok(None)` for anything that is not one of our commands, so the bot
    /// stays quiet in groups shared with other bots.
    pub fn parse(text: &str, mentions: &[i64], prefix: &str) -> Result<Option<Command>, UsageError> {
        let Some(body) = text.trim().strip_prefix(prefix) else {
            return Ok(None);
        };
        let mut tokens = body.split_whitespace();
        let Some(name) = tokens.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = tokens.collect();

        let command = match name.to_lowercase().as_str() {
            "帮助" | "help" => Command::Help,
            "注册" | "开户" | "register" => Command::Register,
            "余额" | "balance" => Command::Balance,
            "我的账户" | "account" => Command::Account,
            "货币" | "token" => Command::TokenInfo,
            "签到" | "checkin" => Command::CheckIn,
            "排行榜" | "rank" => Command::Leaderboard,
            "转账" | "transfer" => {
                let amount = parse_amount(args.first(), || usage(prefix, "转账 数量 @用户"))?;
                let recipient = match (mentions.first(), args.get(1)) {
                    (Some(&qq_id), _) => qq_id,
                    (None, Some(raw)) => raw
                        .parse::<i64>()
                        .map_err(|_| UsageError::MissingRecipient(prefix.to_string()))?,
                    (None, None) => return Err(UsageError::MissingRecipient(prefix.to_string())),
                };
                Command::Transfer { amount, recipient }
            }
            "提现" | "withdraw" => {
                let (amount, address) = amount_and_address(&args, || usage(prefix, "提现 数量 地址"))?;
                Command::Withdraw { amount, address }
            }
            "增发" | "mint" => {
                let (amount, address) = amount_and_address(&args, || usage(prefix, "增发 数量 地址"))?;
                Command::Mint { amount, address }
            }
            _ => return Ok(None),
        };

        Ok(Some(command))
    }
}

fn usage(prefix: &str, form: &str) -> UsageError {
    UsageError::Usage(format!("{}{}", prefix, form))
}

fn parse_amount(raw: Option<&&str>, missing: impl Fn() -> UsageError) -> Result<u64, UsageError> {
    let raw = raw.ok_or_else(&missing)?;
    let amount = raw
        .parse::<u64>()
        .map_err(|_| UsageError::InvalidAmount(raw.to_string()))?;
    if amount == 0 {
        return Err(UsageError::ZeroAmount);
    }
    Ok(amount)
}

fn amount_and_address(
    args: &[&str],
    missing: impl Fn() -> UsageError,
) -> Result<(u64, Address), UsageError> {
    if args.len() < 2 {
        return Err(missing());
    }
    let amount = parse_amount(args.first(), &missing)?;
    let address =
        parse_address(args[1]).map_err(|_| UsageError::InvalidAddress(args[1].to_string()))?;
    Ok((amount, address))
}

pub fn help_text(prefix: &str) -> String {
    let lines = [
        ("帮助", "显示此帮助菜单"),
        ("注册 (或 开户)", "创建你的链上钱包"),
        ("余额", "查询你的代币和ETH余额"),
        ("我的账户", "显示你的钱包地址"),
        ("货币", "查看代币名称、符号和总供应量"),
        ("转账 <数量> @某人", "给QQ好友转账"),
        ("提现 <数量> <你的外部地址>", "将代币提到你自己的钱包"),
        ("签到", "每日签到领取代币"),
        ("排行榜", "查看代币持有者排行"),
    ];

    let mut text = String::from("===============\n💎 以太坊QQ钱包 💎\n===============\n");
    for (form, description) in lines {
        text.push_str(&format!("{}{} - {}\n", prefix, form, description));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn parse(text: &str) -> Result<Option<Command>, UsageError> {
        Command::parse(text, &[], "/")
    }

    #[test]
    fn recognizes_names_and_aliases() {
        assert_eq!(parse("/注册").unwrap(), Some(Command::Register));
        assert_eq!(parse("/开户").unwrap(), Some(Command::Register));
        assert_eq!(parse("  /REGISTER  ").unwrap(), Some(Command::Register));
        assert_eq!(parse("/余额").unwrap(), Some(Command::Balance));
        assert_eq!(parse("/我的账户").unwrap(), Some(Command::Account));
        assert_eq!(parse("/货币").unwrap(), Some(Command::TokenInfo));
        assert_eq!(parse("/签到").unwrap(), Some(Command::CheckIn));
        assert_eq!(parse("/排行榜").unwrap(), Some(Command::Leaderboard));
        assert_eq!(parse("/help").unwrap(), Some(Command::Help));
    }

    #[test]
    fn ignores_plain_chat_and_unknown_commands() {
        assert_eq!(parse("注册").unwrap(), None);
        assert_eq!(parse("hello there").unwrap(), None);
        assert_eq!(parse("/weather beijing").unwrap(), None);
        assert_eq!(parse("/").unwrap(), None);
        assert_eq!(Command::parse("!注册", &[], "!").unwrap(), Some(Command::Register));
    }

    #[test]
    fn transfer_takes_mention_or_numeric_id() {
        let by_mention = Command::parse("/转账 25", &[424242], "/").unwrap();
        assert_eq!(
            by_mention,
            Some(Command::Transfer {
                amount: 25,
                recipient: 424242
            })
        );

        let by_id = parse("/transfer 3 10086").unwrap();
        assert_eq!(
            by_id,
            Some(Command::Transfer {
                amount: 3,
                recipient: 10086
            })
        );

        assert_eq!(parse("/转账 25"), Err(UsageError::MissingRecipient("/".into())));
        assert_eq!(parse("/转账 25 bob"), Err(UsageError::MissingRecipient("/".into())));
    }

    #[test]
    fn rejects_bad_amounts() {
        assert_eq!(
            Command::parse("/转账 0", &[1], "/"),
            Err(UsageError::ZeroAmount)
        );
        assert_eq!(
            Command::parse("/转账 -5", &[1], "/"),
            Err(UsageError::InvalidAmount("-5".into()))
        );
        assert_eq!(
            Command::parse("/转账 lots", &[1], "/"),
            Err(UsageError::InvalidAmount("lots".into()))
        );
        assert!(matches!(parse("/转账"), Err(UsageError::Usage(_))));
    }

    #[test]
    fn withdraw_and_mint_validate_addresses() {
        let expected = parse_address(ADDRESS).unwrap();
        assert_eq!(
            parse(&format!("/提现 10 {}", ADDRESS)).unwrap(),
            Some(Command::Withdraw {
                amount: 10,
                address: expected
            })
        );
        assert_eq!(
            parse(&format!("/增发 1000 {}", ADDRESS.to_lowercase())).unwrap(),
            Some(Command::Mint {
                amount: 1000,
                address: expected
            })
        );

        assert_eq!(
            parse("/提现 10 0xnothex"),
            Err(UsageError::InvalidAddress("0xnothex".into()))
        );
        assert!(matches!(parse("/提现 10"), Err(UsageError::Usage(_))));
        assert_eq!(
            parse(&format!("/增发 0 {}", ADDRESS)),
            Err(UsageError::ZeroAmount)
        );
    }

    #[test]
    fn usage_messages_use_the_configured_prefix() {
        let err = Command::parse("#提现 5", &[], "#").unwrap_err();
        assert_eq!(err.to_string(), "❌ 格式错误。用法：#提现 数量 地址");
        assert!(help_text("#").contains("#签到 - 每日签到领取代币"));
    }
}
