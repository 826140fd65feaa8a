//! 대화형 채팅 세션
//!
//! 체인 에러는 세션을 끝내지 않고 사과 메시지로 바꿔 기록합니다.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::chain::RagChain;
use crate::llm::{ChatMessage, Role};

/// 채팅 세션 (체인 + 화면 표시용 로그)
pub struct ChatSession {
    chain: RagChain,
    log: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(chain: RagChain) -> Self {
        Self {
            chain,
            log: Vec::new(),
        }
    }

    /// 사용자 입력 하나 처리 후 표시할 답변 반환
    pub async fn handle(&mut self, input: &str) -> String {
        self.log.push(ChatMessage::user(input));

        let reply = match self.chain.invoke(input).await {
            Ok(output) => output.answer,
            Err(e) => {
                tracing::warn!("Chain failed: {:#}", e);
                format!("Sorry, I encountered an error: {}", e)
            }
        };

        self.log.push(ChatMessage::assistant(reply.clone()));
        reply
    }

    /// 새 대화 (메모리와 로그 초기화)
    pub fn new_chat(&mut self) {
        self.chain.clear_memory();
        self.log.clear();
    }

    pub fn log(&self) -> &[ChatMessage] {
        &self.log
    }

    pub fn chain(&self) -> &RagChain {
        &self.chain
    }
}

/// 표준 입력 기반 채팅 루프
pub async fn run_loop(mut session: ChatSession) -> Result<()> {
    println!("ScalerAssist - Scaler Academy에 대해 질문하세요.");
    println!("    /new: 새 대화, /stats: 메모리 통계, /history: 대화 기록, exit: 종료");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/new" => {
                session.new_chat();
                println!("[OK] 새 대화를 시작합니다. 이전 기록이 삭제되었습니다.");
            }
            "/stats" => {
                let stats = session.chain().memory_stats();
                println!("[*] 요약 길이: {} chars", stats.summary_chars);
                println!(
                    "    윈도우: {}/{} 메시지, 요약 대기: {}, 전체: {}",
                    stats.window_messages,
                    stats.window_size,
                    stats.pending_messages,
                    stats.total_messages
                );
            }
            "/history" => {
                if session.log().is_empty() {
                    println!("[!] 대화 기록이 없습니다.");
                }
                for message in session.log() {
                    let who = match message.role {
                        Role::User => "You",
                        Role::Assistant => "Assistant",
                        Role::System => "System",
                    };
                    println!("{}: {}", who, message.content);
                }
            }
            question => {
                let answer = session.handle(question).await;
                println!("\n{}\n", answer);
            }
        }
    }

    println!("Bye!");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
