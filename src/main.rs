// src/main.rs
use campus_console::bulletin::TopNotices;
use campus_console::dashboard::Dashboard;
use campus_console::notify::{AttendanceBus, BusTransport};
use campus_console::prefs::PrefStore;
use campus_console::refresh::Refresher;
use campus_console::session::Session;
use campus_console::{ApiClient, Config};
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("CAMPUS_API_BASE must be set in .env");
    let client = ApiClient::new(&config).expect("Failed to build HTTP client");
    let prefs = PrefStore::file(config.prefs_path.clone());

    tracing::info!("后端地址: {}", client.base());

    // 1. 会话与导航
    let session = Session::load(&client).await;
    let nav = session.nav();
    println!(
        "{} · {}",
        nav.top.user_name.as_deref().unwrap_or("访客"),
        nav.top.role_label
    );
    let items: Vec<&str> = nav.visible_items().iter().map(|item| item.id()).collect();
    println!("可见菜单: {}", items.join(", "));

    if !session.roles().is_logged_in() {
        tracing::warn!("未登录，请在 CAMPUS_SESSION_COOKIE 中提供会话 Cookie");
        return;
    }

    // 2. 顶栏公告
    let mut notices = TopNotices::new(client.clone(), prefs.clone());
    notices.refresh().await;
    if notices.has_unread() {
        println!("有 {} 条新公告", notices.items().len());
    }

    // 3. 仪表盘：定时刷新 + 考勤通知触发
    let bus = AttendanceBus::new(BusTransport::detect(&config, prefs.clone()));
    let events = bus.subscribe().await;
    let mut dashboard = Dashboard::new(client.clone());
    let mut refresher = Refresher::spawn(config.refresh_interval, Some(events));
    let mut inflight = JoinSet::new();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            trigger = refresher.next() => match trigger {
                Some(trigger) => {
                    tracing::debug!("刷新仪表盘 ({:?})", trigger);
                    inflight.spawn(dashboard.request().run());
                }
                None => break,
            },
            Some(done) = inflight.join_next() => match done {
                Ok(fetched) => {
                    if let Ok(true) = dashboard.apply(fetched) {
                        if let Some(view) = dashboard.view() {
                            println!("{}", view.summary());
                        }
                    }
                }
                Err(e) => tracing::error!("仪表盘任务异常: {}", e),
            },
            _ = &mut shutdown => {
                tracing::info!("收到退出信号");
                break;
            }
        }
    }

    inflight.abort_all();
}
