use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{
    db::WalletStore,
    models::{CheckInClaim, NewWallet, WalletRecord},
};
use evm_token::{format_ether, parse_address, Address, ChainError, TokenLedger, U256};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    command::{help_text, Command},
    event::IncomingMessage,
    locks::UserLocks,
    notify::Notifier,
    reward::RewardTable,
};

pub struct BotSettings {
    pub command_prefix: String,
    pub admin_ids: HashSet<i64>,
    /// Wei sent to every new wallet so it can pay for its own transfers.
    pub registration_gas_fee: U256,
    pub leaderboard_size: usize,
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("sender has no wallet")]
    NotRegistered,

    #[error("recipient {0} has no wallet")]
    RecipientNotRegistered(i64),

    #[error("cannot transfer to self")]
    SelfTransfer,

    #[error("admin only")]
    NotAdmin,

    #[error("owner private key is not configured")]
    MissingOwnerKey,

    #[error("stored wallet of {0} is unusable")]
    CorruptWallet(i64),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl CommandError {
    /// Failures the operator has to look at, as opposed to user mistakes.
    fn is_internal(&self) -> bool {
        match self {
            CommandError::Store(_) | CommandError::CorruptWallet(_) => true,
            CommandError::Chain(e) => !matches!(
                e,
                ChainError::InsufficientFunds { .. } | ChainError::MissingOwnerKey
            ),
            _ => false,
        }
    }

    fn user_message(&self, action: &str, prefix: &str) -> String {
        match self {
            CommandError::NotRegistered => format!("❌ 你还没有注册钱包，请先发送 {}注册", prefix),
            CommandError::RecipientNotRegistered(qq_id) => {
                format!("❌ {}失败：对方用户 ({}) 还没有注册钱包。", action, qq_id)
            }
            CommandError::SelfTransfer => "🤔 不能给自己转账哦。".to_string(),
            CommandError::NotAdmin => "❌ 只有管理员可以使用此命令。".to_string(),
            CommandError::MissingOwnerKey | CommandError::Chain(ChainError::MissingOwnerKey) => {
                format!("❌ 管理员未配置私钥，无法{}。", action)
            }
            CommandError::Chain(ChainError::InsufficientFunds { .. }) => {
                format!("❌ {}失败：您的代币余额不足！", action)
            }
            CommandError::Chain(ChainError::Unconfirmed { tx_hash, .. }) => format!(
                "⚠️ {}交易已提交，确认超时。请稍后查询结果，不要重复操作。\n交易哈希: {}",
                action, tx_hash
            ),
            CommandError::Chain(ChainError::TransactionFailed(_))
            | CommandError::Chain(ChainError::Reverted(_)) => {
                format!("❌ {}失败：交易在链上执行失败。", action)
            }
            CommandError::Chain(ChainError::Connection(_))
            | CommandError::Chain(ChainError::Rpc(_))
            | CommandError::Chain(ChainError::Decode(_)) => {
                format!("❌ {}失败：区块链节点暂时无法访问，请稍后再试。", action)
            }
            CommandError::Chain(ChainError::InvalidKey(_))
            | CommandError::Chain(ChainError::InvalidAddress(_))
            | CommandError::CorruptWallet(_) => {
                format!("❌ {}失败：钱包数据异常，请联系管理员。", action)
            }
            CommandError::Store(_) => format!("❌ {}失败，发生内部错误，请联系管理员。", action),
        }
    }
}

fn action_label(command: &Command) -> &'static str {
    match command {
        Command::Help => "显示帮助",
        Command::Register => "注册",
        Command::Balance => "查询余额",
        Command::Account => "查询账户",
        Command::TokenInfo => "查询代币信息",
        Command::Transfer { .. } => "转账",
        Command::Withdraw { .. } => "提现",
        Command::CheckIn => "签到",
        Command::Leaderboard => "生成排行榜",
        Command::Mint { .. } => "增发",
    }
}

fn wallet_address(wallet: &WalletRecord) -> Result<Address, CommandError> {
    parse_address(&wallet.eth_address).map_err(|_| CommandError::CorruptWallet(wallet.qq_id))
}

/// Turns chat lines into wallet operations and text replies.
pub struct WalletBot<S, L, N> {
    store: S,
    ledger: L,
    notifier: N,
    rewards: RewardTable,
    settings: BotSettings,
    locks: UserLocks,
    clock: fn() -> DateTime<Utc>,
}

impl<S: WalletStore, L: TokenLedger, N: Notifier> WalletBot<S, L, N> {
    pub fn new(store: S, ledger: L, notifier: N, rewards: RewardTable, settings: BotSettings) -> Self {
        Self {
            store,
            ledger,
            notifier,
            rewards,
            settings,
            locks: UserLocks::new(),
            clock: Utc::now,
        }
    }

    #[cfg(test)]
    fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Returns the reply for `message`, or `None` when it is not addressed to
    /// this bot.
    pub async fn handle(&self, message: &IncomingMessage) -> Option<String> {
        let prefix = &self.settings.command_prefix;
        let command = match Command::parse(&message.text, &message.mentions, prefix) {
            Ok(Some(command)) => command,
            Ok(None) => {
                debug!(sender = message.sender_id, "Not a wallet command");
                return None;
            }
            Err(usage) => return Some(usage.to_string()),
        };

        let _guard = self.locks.acquire(message.sender_id).await;
        info!(sender = message.sender_id, command = command.name(), "Handling command");

        let reply = match self.execute(message, &command).await {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_internal() {
                    error!(sender = message.sender_id, command = command.name(), "Command failed: {:#}", e);
                } else {
                    warn!(sender = message.sender_id, command = command.name(), "Command refused: {}", e);
                }
                e.user_message(action_label(&command), prefix)
            }
        };
        Some(reply)
    }

    async fn execute(&self, message: &IncomingMessage, command: &Command) -> Result<String, CommandError> {
        match *command {
            Command::Help => Ok(self.help(message.sender_id)),
            Command::Register => self.register(message).await,
            Command::Balance => self.balance(message).await,
            Command::Account => self.account(message.sender_id).await,
            Command::TokenInfo => self.token_info(message).await,
            Command::Transfer { amount, recipient } => self.transfer(message, amount, recipient).await,
            Command::Withdraw { amount, address } => self.withdraw(message, amount, address).await,
            Command::CheckIn => self.check_in(message).await,
            Command::Leaderboard => self.leaderboard(message).await,
            Command::Mint { amount, address } => self.mint(message, amount, address).await,
        }
    }

    async fn wallet_of(&self, qq_id: i64) -> Result<WalletRecord, CommandError> {
        self.store.find(qq_id).await?.ok_or(CommandError::NotRegistered)
    }

    fn help(&self, sender_id: i64) -> String {
        let prefix = &self.settings.command_prefix;
        let mut text = help_text(prefix);
        if self.settings.admin_ids.contains(&sender_id) {
            text.push_str(&format!("{}增发 <数量> <地址> - 管理员增发代币\n", prefix));
        }
        text
    }

    async fn register(&self, message: &IncomingMessage) -> Result<String, CommandError> {
        let qq_id = message.sender_id;
        if let Some(existing) = self.store.find(qq_id).await? {
            return Ok(already_registered(&existing));
        }

        self.notifier
            .notify(message, "⌛ 正在为你创建链上账户并转入初始Gas费，请稍候...")
            .await;

        let account = self.ledger.create_account();
        let gas_fee = self.settings.registration_gas_fee;
        let funded = self.ledger.has_owner_key() && !gas_fee.is_zero();
        if funded {
            let tx_hash = self.ledger.fund_gas(account.address, gas_fee).await?;
            info!(qq_id, address = %account.address, %tx_hash, "Funded gas for new wallet");
        }

        let created = self
            .store
            .insert(NewWallet {
                qq_id,
                eth_address: account.address.to_checksum(None),
                eth_private_key: account.private_key,
            })
            .await?;

        let Some(wallet) = created else {
            let existing = self.wallet_of(qq_id).await?;
            warn!(qq_id, "Concurrent registration won, discarding new account");
            return Ok(already_registered(&existing));
        };
        info!(qq_id, address = %wallet.eth_address, "Registered wallet");

        let mut reply = format!("🎉 注册成功！\n你的专属钱包地址是:\n{}", wallet.eth_address);
        if funded {
            reply.push_str(&format!("\n已为你转入 {} ETH 作为初始Gas费。", format_ether(gas_fee)));
        }
        Ok(reply)
    }

    async fn balance(&self, message: &IncomingMessage) -> Result<String, CommandError> {
        let wallet = self.wallet_of(message.sender_id).await?;
        let address = wallet_address(&wallet)?;

        self.notifier.notify(message, "⌛ 正在查询链上余额，请稍候...").await;
        let token_balance = self.ledger.token_balance(address).await?;
        let native_balance = self.ledger.native_balance(address).await?;

        Ok(format!(
            "查询成功！\n💰 代币余额: {}\n⛽ Gas (ETH): {}",
            token_balance,
            format_ether(native_balance)
        ))
    }

    async fn account(&self, qq_id: i64) -> Result<String, CommandError> {
        let wallet = self.wallet_of(qq_id).await?;
        Ok(format!("你的钱包地址是:\n{}", wallet.eth_address))
    }

    async fn token_info(&self, message: &IncomingMessage) -> Result<String, CommandError> {
        self.notifier.notify(message, "⌛ 正在查询代币信息，请稍候...").await;
        let info = self.ledger.token_info().await?;

        Ok(format!(
            "代币信息查询成功！\n🏷️ 名称: {}\n🔤 符号: {}\n🔢 精度: {}\n💎 总供应量: {}",
            info.name, info.symbol, info.decimals, info.total_supply
        ))
    }

    async fn transfer(
        &self,
        message: &IncomingMessage,
        amount: u64,
        recipient: i64,
    ) -> Result<String, CommandError> {
        let sender_id = message.sender_id;
        if sender_id == recipient {
            return Err(CommandError::SelfTransfer);
        }

        let sender = self.wallet_of(sender_id).await?;
        let receiver = self
            .store
            .find(recipient)
            .await?
            .ok_or(CommandError::RecipientNotRegistered(recipient))?;
        let to = wallet_address(&receiver)?;

        self.notifier
            .notify(
                message,
                &format!("⌛ 正在准备向用户 {} 转账 {} 代币，请稍候...", recipient, amount),
            )
            .await;

        let tx_hash = self
            .ledger
            .transfer_token(&sender.eth_private_key, to, U256::from(amount))
            .await?;
        info!(from = sender_id, to = recipient, amount, %tx_hash, "Transfer between users");

        Ok(format!(
            "✅ 转账成功！\n您已向 {} 转账 {}。\n交易哈希: {}",
            recipient, amount, tx_hash
        ))
    }

    async fn withdraw(
        &self,
        message: &IncomingMessage,
        amount: u64,
        address: Address,
    ) -> Result<String, CommandError> {
        let wallet = self.wallet_of(message.sender_id).await?;
        let destination = address.to_checksum(None);

        self.notifier
            .notify(
                message,
                &format!("⌛ 正在向地址 {} 提现 {} 代币，请稍候...", destination, amount),
            )
            .await;

        let tx_hash = self
            .ledger
            .transfer_token(&wallet.eth_private_key, address, U256::from(amount))
            .await?;
        info!(qq_id = message.sender_id, %destination, amount, %tx_hash, "Withdrawal");

        Ok(format!("✅ 提现成功！\n交易哈希: {}", tx_hash))
    }

    async fn check_in(&self, message: &IncomingMessage) -> Result<String, CommandError> {
        let qq_id = message.sender_id;
        let wallet = self.wallet_of(qq_id).await?;
        let address = wallet_address(&wallet)?;
        if !self.ledger.has_owner_key() {
            return Err(CommandError::MissingOwnerKey);
        }

        let now = (self.clock)();
        let previous = match self.store.claim_check_in(qq_id, now).await? {
            CheckInClaim::NotRegistered => return Err(CommandError::NotRegistered),
            CheckInClaim::AlreadyCheckedIn => {
                return Ok("🤔 你今天已经签过到了，明天再来吧！".to_string())
            }
            CheckInClaim::Claimed { previous } => previous,
        };

        let reward = self.rewards.draw(&mut rand::thread_rng());
        self.notifier
            .notify(message, "⌛ 正在为你签到并发送奖励，请稍候...")
            .await;

        match self.ledger.mint_token(address, U256::from(reward)).await {
            Ok(tx_hash) => {
                info!(qq_id, reward, %tx_hash, "Check-in reward minted");
                Ok(format!("🎉 签到成功！你获得了 {} 代币奖励！", reward))
            }
            Err(e) if e.may_have_applied() => {
                // The reward may still land, so the day stays used.
                warn!(qq_id, reward, "Check-in mint unconfirmed, keeping the claim");
                Err(e.into())
            }
            Err(e) => {
                // Nothing was minted; give the day back so the user can retry.
                if let Err(release) = self.store.release_check_in(qq_id, now, previous).await {
                    error!(qq_id, "Failed to release check-in claim: {:#}", release);
                }
                Err(e.into())
            }
        }
    }

    async fn leaderboard(&self, message: &IncomingMessage) -> Result<String, CommandError> {
        self.notifier
            .notify(message, "⌛ 正在查询全服余额并生成排行榜，这可能需要一点时间...")
            .await;

        let wallets = self.store.all().await?;
        if wallets.is_empty() {
            return Ok("目前还没有用户注册。".to_string());
        }

        let mut balances = Vec::with_capacity(wallets.len());
        for wallet in &wallets {
            let Ok(address) = wallet_address(wallet) else {
                warn!(qq_id = wallet.qq_id, "Skipping wallet with unusable address");
                continue;
            };
            match self.ledger.token_balance(address).await {
                Ok(balance) => balances.push((wallet.qq_id, balance)),
                Err(e) => warn!(qq_id = wallet.qq_id, "Skipping leaderboard entry: {}", e),
            }
        }

        if balances.is_empty() {
            return Ok("❌ 暂时无法查询余额，请稍后再试。".to_string());
        }

        balances.sort_by(|a, b| b.1.cmp(&a.1));

        let mut text = String::from("🏆 代币富豪榜 🏆\n");
        for (rank, (qq_id, balance)) in balances
            .iter()
            .take(self.settings.leaderboard_size)
            .enumerate()
        {
            text.push_str(&format!("\n第 {} 名: {} - 💰 {}", rank + 1, qq_id, balance));
        }
        Ok(text)
    }

    async fn mint(
        &self,
        message: &IncomingMessage,
        amount: u64,
        address: Address,
    ) -> Result<String, CommandError> {
        if !self.settings.admin_ids.contains(&message.sender_id) {
            return Err(CommandError::NotAdmin);
        }
        if !self.ledger.has_owner_key() {
            return Err(CommandError::MissingOwnerKey);
        }

        let destination = address.to_checksum(None);
        self.notifier
            .notify(message, &format!("⌛ 正在向 {} 增发 {} 代币...", destination, amount))
            .await;

        let tx_hash = self.ledger.mint_token(address, U256::from(amount)).await?;
        info!(admin = message.sender_id, %destination, amount, %tx_hash, "Admin mint");

        Ok(format!("✅ 增发成功！\n交易哈希: {}", tx_hash))
    }
}

fn already_registered(wallet: &WalletRecord) -> String {
    format!(
        "🤔 你已经注册过了，无需重复注册。\n你的地址是: {}",
        wallet.eth_address
    )
}
