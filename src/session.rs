// src/session.rs
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, Query};

// --- 1. 角色 ---

/// 后端角色代码；未知代码原样保留
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    SuperAdmin,
    Principal,
    VicePrincipal,
    Dean,
    ViceDean,
    HeadTeacher,
    Teacher,
    Student,
    Anonymous,
    Other(String),
}

impl Role {
    pub const ALL: [Role; 9] = [
        Role::SuperAdmin,
        Role::Principal,
        Role::VicePrincipal,
        Role::Dean,
        Role::ViceDean,
        Role::HeadTeacher,
        Role::Teacher,
        Role::Student,
        Role::Anonymous,
    ];

    pub fn code(&self) -> &str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Principal => "principal",
            Role::VicePrincipal => "vice_principal",
            Role::Dean => "dean",
            Role::ViceDean => "vice_dean",
            Role::HeadTeacher => "head_teacher",
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Anonymous => "anonymous",
            Role::Other(code) => code,
        }
    }
}

impl From<String> for Role {
    fn from(code: String) -> Self {
        match code.as_str() {
            "super_admin" => Role::SuperAdmin,
            "principal" => Role::Principal,
            "vice_principal" => Role::VicePrincipal,
            "dean" => Role::Dean,
            "vice_dean" => Role::ViceDean,
            "head_teacher" => Role::HeadTeacher,
            "teacher" => Role::Teacher,
            "student" => Role::Student,
            "anonymous" | "" => Role::Anonymous,
            _ => Role::Other(code),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.code().to_owned()
    }
}

/// 角色的中文名称，未知代码原样返回
pub fn role_display(code: &str) -> String {
    match code {
        "super_admin" => "超级管理员",
        "principal" => "校长",
        "vice_principal" => "副校长",
        "dean" => "院长",
        "vice_dean" => "副院长",
        "teacher" => "教师",
        "head_teacher" => "班主任",
        "student" => "学生",
        "anonymous" => "访客",
        other => other,
    }
    .to_owned()
}

/// 从角色派生出的权限判断
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSet {
    pub admin: bool,
    pub dean: bool,
    pub teacher: bool,
    pub head_teacher: bool,
    pub student: bool,
    pub logged_in: bool,
}

impl RoleSet {
    pub fn of(role: &Role) -> Self {
        Self {
            admin: matches!(role, Role::SuperAdmin | Role::Principal | Role::VicePrincipal),
            dean: matches!(role, Role::Dean | Role::ViceDean),
            teacher: matches!(role, Role::Teacher | Role::HeadTeacher),
            head_teacher: *role == Role::HeadTeacher,
            student: *role == Role::Student,
            logged_in: *role != Role::Anonymous,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn is_dean(&self) -> bool {
        self.dean
    }

    pub fn is_teacher(&self) -> bool {
        self.teacher
    }

    pub fn is_head_teacher(&self) -> bool {
        self.head_teacher
    }

    pub fn is_student(&self) -> bool {
        self.student
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    /// 管理员或院长
    pub fn is_manager(&self) -> bool {
        self.admin || self.dean
    }
}

// --- 2. 导航 ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NavItem {
    Dashboard,
    Students,
    Teachers,
    Accounts,
    Org,
    Courses,
    Attendance,
    Grades,
    Notices,
    Calendar,
    Admin,
    Login,
    Logout,
}

impl NavItem {
    pub const ALL: [NavItem; 13] = [
        NavItem::Dashboard,
        NavItem::Students,
        NavItem::Teachers,
        NavItem::Accounts,
        NavItem::Org,
        NavItem::Courses,
        NavItem::Attendance,
        NavItem::Grades,
        NavItem::Notices,
        NavItem::Calendar,
        NavItem::Admin,
        NavItem::Login,
        NavItem::Logout,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            NavItem::Dashboard => "nav-dashboard",
            NavItem::Students => "nav-students",
            NavItem::Teachers => "nav-teachers",
            NavItem::Accounts => "nav-accounts",
            NavItem::Org => "nav-org",
            NavItem::Courses => "nav-courses",
            NavItem::Attendance => "nav-attendance",
            NavItem::Grades => "nav-grades",
            NavItem::Notices => "nav-notices",
            NavItem::Calendar => "nav-calendar",
            NavItem::Admin => "nav-admin",
            NavItem::Login => "nav-login",
            NavItem::Logout => "nav-logout",
        }
    }

    fn allowed(&self, r: &RoleSet) -> bool {
        // 学生只保留个人账户入口
        if r.student {
            return matches!(self, NavItem::Accounts | NavItem::Logout);
        }
        match self {
            NavItem::Dashboard => r.logged_in,
            // 普通教师看不到学生管理
            NavItem::Students => r.admin || r.dean || r.head_teacher,
            NavItem::Teachers | NavItem::Org => r.admin || r.dean,
            NavItem::Accounts => r.logged_in,
            NavItem::Courses | NavItem::Attendance | NavItem::Grades => {
                r.admin || r.dean || r.teacher
            }
            NavItem::Notices | NavItem::Calendar => r.logged_in,
            NavItem::Admin => r.admin,
            NavItem::Login => !r.logged_in,
            NavItem::Logout => r.logged_in,
        }
    }
}

/// 顶部栏
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopBar {
    pub user_menu: bool,
    pub login_button: bool,
    pub admin_link: bool,
    pub user_name: Option<String>,
    pub role_label: String,
}

impl TopBar {
    pub const USER_MENU: &'static str = "topUserMenu";
    pub const LOGIN_BUTTON: &'static str = "topLoginBtn";
    pub const ADMIN_LINK: &'static str = "topAdminLink";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavGate {
    pub role: Role,
    pub roles: RoleSet,
    visible: Vec<NavItem>,
    pub top: TopBar,
}

impl NavGate {
    pub fn for_role(role: &Role, username: Option<&str>) -> Self {
        let roles = RoleSet::of(role);
        let visible = NavItem::ALL
            .iter()
            .copied()
            .filter(|item| item.allowed(&roles))
            .collect();
        let top = TopBar {
            user_menu: roles.logged_in,
            login_button: !roles.logged_in,
            admin_link: roles.logged_in && roles.admin,
            user_name: roles.logged_in.then(|| {
                username
                    .filter(|u| !u.is_empty())
                    .unwrap_or("User")
                    .to_owned()
            }),
            role_label: role_display(role.code()),
        };
        Self {
            role: role.clone(),
            roles,
            visible,
            top,
        }
    }

    pub fn is_visible(&self, item: NavItem) -> bool {
        self.visible.contains(&item)
    }

    pub fn visible_items(&self) -> &[NavItem] {
        &self.visible
    }

    /// 按元素 id 查询，包括顶部栏的三个控件；未知 id 一律隐藏
    pub fn is_visible_id(&self, id: &str) -> bool {
        match id {
            TopBar::USER_MENU => self.top.user_menu,
            TopBar::LOGIN_BUTTON => self.top.login_button,
            TopBar::ADMIN_LINK => self.top.admin_link,
            _ => NavItem::ALL
                .iter()
                .find(|item| item.id() == id)
                .map_or(false, |item| self.is_visible(*item)),
        }
    }
}

// --- 3. 会话 ---

/// `/api/accounts/me` 的返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Me {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub profile_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub me: Option<Me>,
    pub role: Role,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            me: None,
            role: Role::Anonymous,
        }
    }

    /// 读取当前用户；任何失败都按访客处理
    pub async fn load(client: &ApiClient) -> Self {
        match client.get_as::<Me>("/api/accounts/me", &Query::new()).await {
            Ok(me) => {
                let role = me.role.clone().unwrap_or(Role::Anonymous);
                tracing::info!("当前用户: {} ({})", me.username, role.code());
                Self { me: Some(me), role }
            }
            Err(e) => {
                tracing::debug!("未登录或会话失效: {}", e);
                Self::anonymous()
            }
        }
    }

    pub fn roles(&self) -> RoleSet {
        RoleSet::of(&self.role)
    }

    pub fn nav(&self) -> NavGate {
        NavGate::for_role(&self.role, self.me.as_ref().map(|m| m.username.as_str()))
    }

    pub fn username(&self) -> Option<&str> {
        self.me.as_ref().map(|m| m.username.as_str())
    }

    pub fn profile_id(&self) -> Option<i64> {
        self.me.as_ref().and_then(|m| m.profile_id)
    }
}
